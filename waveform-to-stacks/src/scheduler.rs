//! Level-triggered scheduling of the per-minute processing cycle.
//!
//! The wall clock, not an event stream, triggers work: whenever the current
//! minute-of-hour is one of the configured action-minutes, the cycle runs
//! once for that minute. [MinuteGate] carries the only scheduling state and
//! is owned by the caller's loop, so there is no hidden global memory of what
//! has fired.
//!
//! Within a cycle, each transmitter's CRT task signals completion to its
//! dependent (Tx, Rx) tasks over a watch channel — the bounded-timeout
//! producer/consumer handshake, without polling the filesystem for the
//! artifact to appear.
use crate::cascade::{self, CrtOutcome, CycleContext};
use crate::store::WaveformStore;
use chrono::{DateTime, Timelike, Utc};
use em_survey_common::{
    StationId,
    metrics::{
        failures::{FailureKind, get_label as failure_label},
        names::FAILURES,
    },
};
use metrics::counter;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Tracks which action-minutes have fired in the current pass over the clock.
///
/// Level-triggered: a minute fires once while the clock sits on it, and the
/// memory resets as soon as the clock moves off every configured minute, so
/// the same minute fires again next hour.
#[derive(Debug)]
pub(crate) struct MinuteGate {
    minutes: Vec<u32>,
    processed: HashSet<u32>,
}

impl MinuteGate {
    pub(crate) fn new(minutes: &[u32]) -> Self {
        Self {
            minutes: minutes.to_vec(),
            processed: HashSet::new(),
        }
    }

    /// Some(minute) exactly once per dwell on a configured action-minute.
    pub(crate) fn observe(&mut self, now: DateTime<Utc>) -> Option<u32> {
        let minute = now.minute();
        if self.minutes.contains(&minute) {
            if self.processed.insert(minute) {
                Some(minute)
            } else {
                None
            }
        } else {
            self.processed.clear();
            None
        }
    }
}

/// How long a (Tx, Rx) task may wait for its CRT: the gap to the next
/// action-minute, capped. Waiting longer would collide with the next cycle.
pub(crate) fn crt_wait_timeout(now: DateTime<Utc>, minutes: &[u32], cap: Duration) -> Duration {
    let current = now.minute();
    let gap_minutes = minutes
        .iter()
        .map(|&minute| match (minute + 60 - current) % 60 {
            0 => 60,
            gap => gap,
        })
        .min()
        .unwrap_or(60);
    let gap_seconds = (u64::from(gap_minutes) * 60).saturating_sub(u64::from(now.second())).max(1);
    cap.min(Duration::from_secs(gap_seconds))
}

/// Runs one full cycle for `minute_end`: every Tx in parallel, and every
/// (Tx, Rx) pair in parallel behind its Tx's completion signal.
pub(crate) async fn process_minute<S>(context: Arc<CycleContext<S>>, minute_end: DateTime<Utc>)
where
    S: WaveformStore + Send + Sync + 'static,
{
    let wait = crt_wait_timeout(
        minute_end,
        &context.parameters.minutes_of_action,
        context.crt_wait_cap,
    );

    let mut handles = Vec::new();
    for &tx in &context.parameters.tx_id {
        let (sender, receiver) = watch::channel(None::<CrtOutcome>);

        for &rx in &context.parameters.rx_id {
            let context = context.clone();
            let receiver = receiver.clone();
            handles.push(tokio::spawn(run_pair(
                context, tx, rx, minute_end, receiver, wait,
            )));
        }

        let context = context.clone();
        handles.push(tokio::spawn(async move {
            let outcome = cascade::build_current_profile(context.as_ref(), tx, minute_end);
            // Receivers hold the other end; a send can only fail once every
            // pair has already given up.
            let _ = sender.send(Some(outcome));
        }));
    }

    for handle in handles {
        if let Err(error) = handle.await {
            error!("cycle task panicked: {error}");
        }
    }
    info!(minute = minute_end.minute(), "cycle complete");
}

/// One (Tx, Rx) pair: wait for the CRT signal, then run the receiver chain.
///
/// A timeout is terminal for this (tx, rx, minute) triple — no retry within
/// the cycle, placeholders on disk instead.
async fn run_pair<S>(
    context: Arc<CycleContext<S>>,
    tx: StationId,
    rx: StationId,
    minute_end: DateTime<Utc>,
    mut receiver: watch::Receiver<Option<CrtOutcome>>,
    wait: Duration,
) where
    S: WaveformStore + Send + Sync + 'static,
{
    let signal = tokio::time::timeout(wait, async {
        loop {
            if let Some(outcome) = receiver.borrow_and_update().clone() {
                return Some(outcome);
            }
            if receiver.changed().await.is_err() {
                return None;
            }
        }
    })
    .await;

    match signal {
        Ok(Some(CrtOutcome::Ready { path })) => {
            if let Err(error) =
                cascade::run_receiver_chain(context.as_ref(), tx, rx, &path, minute_end)
            {
                counter!(FAILURES, &[failure_label(FailureKind::ArtifactError)]).increment(1);
                warn!(tx, rx, "receiver chain failed: {error}; writing placeholders");
                fall_back_to_placeholders(context.as_ref(), tx, rx, minute_end);
            }
        }
        Ok(Some(CrtOutcome::Empty)) | Ok(None) => {
            fall_back_to_placeholders(context.as_ref(), tx, rx, minute_end);
        }
        Err(_elapsed) => {
            counter!(FAILURES, &[failure_label(FailureKind::CrtTimeout)]).increment(1);
            warn!(tx, rx, "current profile did not appear in time");
            fall_back_to_placeholders(context.as_ref(), tx, rx, minute_end);
        }
    }
}

fn fall_back_to_placeholders<S>(
    context: &CycleContext<S>,
    tx: StationId,
    rx: StationId,
    minute_end: DateTime<Utc>,
) {
    if let Err(error) = cascade::write_empty_chain(context, tx, rx, minute_end) {
        error!(tx, rx, "cannot write placeholder artifacts: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::artifact_path;
    use crate::parameters::SegmentationSettings;
    use crate::store::{StoreError, Waveform};
    use chrono::TimeZone;
    use em_survey_common::{Real, config::Parameters};
    use std::{collections::HashMap, fs, path::PathBuf};

    struct FixedStore {
        waveforms: HashMap<StationId, Waveform>,
    }

    impl WaveformStore for FixedStore {
        fn fetch(
            &self,
            station: StationId,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Option<Waveform>, StoreError> {
            Ok(self.waveforms.get(&station).cloned())
        }
    }

    fn minute_end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 18, 6, 30, 0).unwrap()
    }

    fn square_wave(scale: Real) -> Vec<Real> {
        let mut samples = Vec::new();
        for level in [0.0, 10.0, 0.0, -10.0, 0.0] {
            samples.extend(std::iter::repeat_n(level * scale, 60));
        }
        samples
    }

    fn test_tree(tag: &str, stations: &[StationId]) -> (PathBuf, PathBuf) {
        let root = std::env::temp_dir().join(format!("w2s-sched-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let input = root.join("in");
        let output = root.join("out");
        fs::create_dir_all(&output).unwrap();
        for station in stations {
            let dir = input.join(station.to_string());
            fs::create_dir_all(&dir).unwrap();
            let factor = if *station >= 2000 { 2.0 } else { 1.0 };
            fs::write(
                dir.join("acq.csv"),
                format!("ID,conversion_factor,sample_interval\n{station},{factor},0.1\n"),
            )
            .unwrap();
        }
        (input, output)
    }

    fn context_with(
        tag: &str,
        waveforms: HashMap<StationId, Waveform>,
    ) -> Arc<CycleContext<FixedStore>> {
        let (input, output) = test_tree(tag, &[1001, 2001]);
        Arc::new(CycleContext {
            parameters: Parameters {
                input_path: input,
                output_path: output,
                tx_id: vec![1001],
                rx_id: vec![2001],
                stack_time_window: 1,
                minutes_of_action: vec![0, 30],
            },
            settings: SegmentationSettings::default(),
            store: FixedStore { waveforms },
            crt_wait_cap: Duration::from_secs(300),
        })
    }

    #[test]
    fn gate_fires_once_per_dwell_and_resets_off_minute() {
        let mut gate = MinuteGate::new(&[15, 30]);
        let at = |minute| Utc.with_ymd_and_hms(2024, 6, 18, 6, minute, 0).unwrap();

        assert_eq!(gate.observe(at(14)), None);
        assert_eq!(gate.observe(at(15)), Some(15));
        assert_eq!(gate.observe(at(15)), None);
        assert_eq!(gate.observe(at(30)), Some(30));
        // Clock moves off every configured minute: memory resets.
        assert_eq!(gate.observe(at(31)), None);
        assert_eq!(gate.observe(at(15)), Some(15));
    }

    #[test]
    fn wait_timeout_is_the_gap_to_the_next_action_minute() {
        let now = Utc.with_ymd_and_hms(2024, 6, 18, 6, 30, 10).unwrap();
        let cap = Duration::from_secs(600);
        assert_eq!(
            crt_wait_timeout(now, &[30, 35], cap),
            Duration::from_secs(5 * 60 - 10)
        );
        // Sole action-minute: the gap is the full hour, so the cap binds.
        assert_eq!(crt_wait_timeout(now, &[30], cap), cap);
    }

    #[tokio::test]
    async fn full_cycle_produces_the_whole_artifact_chain() {
        let start = minute_end() - chrono::Duration::minutes(1);
        let mut waveforms = HashMap::new();
        waveforms.insert(
            1001,
            Waveform {
                samples: square_wave(1.0),
                start,
                sample_interval: 0.1,
            },
        );
        waveforms.insert(
            2001,
            Waveform {
                samples: square_wave(0.25),
                start,
                sample_interval: 0.1,
            },
        );
        let context = context_with("full", waveforms);
        process_minute(context.clone(), minute_end()).await;

        let output = &context.parameters.output_path;
        let crt = fs::read_to_string(artifact_path(output, minute_end(), "1001", "crt")).unwrap();
        // Header plus one row per plateau before the last transition.
        assert_eq!(crt.lines().count(), 5);

        let vsb =
            fs::read_to_string(artifact_path(output, minute_end(), "1001-2001", "vsb")).unwrap();
        assert_eq!(vsb.lines().count(), 5);

        let vpm =
            fs::read_to_string(artifact_path(output, minute_end(), "1001-2001", "vpm")).unwrap();
        assert_eq!(vpm.lines().count(), 2);

        let vsk =
            fs::read_to_string(artifact_path(output, minute_end(), "1001-2001", "vsk")).unwrap();
        // Currents [0, 10, 0, -10], voltages [0, 5, 0, -5]: ratios 0 and 1,
        // positive overall sign.
        assert_eq!(vsk, "+0.500\n");
    }

    #[tokio::test]
    async fn missing_transmitter_degrades_to_placeholders() {
        let context = context_with("no-tx", HashMap::new());
        process_minute(context.clone(), minute_end()).await;

        let output = &context.parameters.output_path;
        for (station, extension) in [
            ("1001", "crt"),
            ("1001-2001", "vsb"),
            ("1001-2001", "vpm"),
            ("1001-2001", "vsk"),
        ] {
            let path = artifact_path(output, minute_end(), station, extension);
            assert_eq!(
                fs::read_to_string(&path).unwrap(),
                "",
                "expected empty placeholder at {}",
                path.display()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn crt_timeout_writes_placeholders_for_the_pair() {
        let context = context_with("timeout", HashMap::new());
        let (sender, receiver) = watch::channel(None::<CrtOutcome>);

        run_pair(
            context.clone(),
            1001,
            2001,
            minute_end(),
            receiver,
            Duration::from_secs(300),
        )
        .await;
        // The producer never signalled; the sender must outlive the wait for
        // this to be a genuine timeout rather than a closed channel.
        drop(sender);

        let output = &context.parameters.output_path;
        for extension in ["vsb", "vpm", "vsk"] {
            let path = artifact_path(output, minute_end(), "1001-2001", extension);
            assert_eq!(fs::read_to_string(&path).unwrap(), "");
        }
    }
}
