//! Drives the artifact chain for one action-minute.
//!
//! The transmitter side produces the CRT; the receiver side replays it from
//! disk into VSB, VPM and VSK. Each stage re-reads its predecessor's file
//! rather than trusting in-memory state, so the persisted chain is always the
//! chain that was actually computed. Failures isolate at the smallest unit —
//! one (Tx, Rx) pair never takes another down — and every terminal failure
//! still leaves a (possibly empty) file on disk.
use crate::{
    artifacts::{
        self, ArtifactError, artifact_path,
        current_profile::CurrentProfile,
        differential::DifferentialVoltage,
        matched_voltage::MatchedVoltage,
        stacked,
    },
    parameters::SegmentationSettings,
    segmentation::{SegmentationError, amplitude::extract_amplitudes, boundary::detect_boundaries},
    store::{StoreError, WaveformStore},
};
use chrono::{DateTime, Duration, Utc};
use em_survey_common::{
    StationId,
    calibration::{self, CalibrationError},
    config::Parameters,
    metrics::{
        artifacts::{ArtifactKind, get_label as artifact_label},
        failures::{FailureKind, get_label as failure_label},
        names::{ARTIFACTS_WRITTEN, FAILURES},
    },
};
use metrics::counter;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub(crate) enum CycleError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl CycleError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            CycleError::Calibration(_) => FailureKind::CalibrationError,
            CycleError::Store(_) => FailureKind::StoreError,
            CycleError::Segmentation(_) => FailureKind::SegmentationFailed,
            CycleError::Artifact(_) => FailureKind::ArtifactError,
        }
    }
}

/// Everything one processing cycle needs, shared read-only across its tasks.
pub(crate) struct CycleContext<S> {
    pub(crate) parameters: Parameters,
    pub(crate) settings: SegmentationSettings,
    pub(crate) store: S,
    /// Upper bound on how long a (Tx, Rx) task waits for its CRT.
    pub(crate) crt_wait_cap: std::time::Duration,
}

/// Broadcast from a Tx task to its dependent (Tx, Rx) tasks.
#[derive(Debug, Clone)]
pub(crate) enum CrtOutcome {
    /// A non-empty profile exists at `path`.
    Ready { path: PathBuf },
    /// The recording was unavailable or contained no usable segments; a
    /// placeholder artifact exists, and the receiver side should write its
    /// own placeholders rather than wait.
    Empty,
}

/// Builds and persists the Tx current profile over
/// `[minute_end - stack_window, minute_end]`.
///
/// Never fails: any error degrades to an empty placeholder so downstream
/// consumers and batch tooling always find a file.
#[instrument(skip(context))]
pub(crate) fn build_current_profile<S: WaveformStore>(
    context: &CycleContext<S>,
    tx: StationId,
    minute_end: DateTime<Utc>,
) -> CrtOutcome {
    let path = artifact_path(
        &context.parameters.output_path,
        minute_end,
        &tx.to_string(),
        "crt",
    );
    match try_build_profile(context, tx, minute_end) {
        Ok(Some(profile)) if !profile.is_empty() => match profile.write(&path) {
            Ok(()) => {
                counter!(ARTIFACTS_WRITTEN, &[artifact_label(ArtifactKind::Crt)]).increment(1);
                info!(segments = profile.rows.len(), "current profile written");
                CrtOutcome::Ready { path }
            }
            Err(error) => {
                warn!("cannot persist current profile: {error}");
                counter!(FAILURES, &[failure_label(FailureKind::ArtifactError)]).increment(1);
                CrtOutcome::Empty
            }
        },
        Ok(Some(profile)) => {
            // Segmentation ran but found nothing; keep the header so the
            // sentinel still anchors its minute.
            if let Err(error) = profile.write(&path) {
                warn!("cannot persist empty current profile: {error}");
            }
            CrtOutcome::Empty
        }
        Ok(None) => {
            counter!(FAILURES, &[failure_label(FailureKind::NoTxCoverage)]).increment(1);
            warn!("no transmitter coverage in stacking window");
            if let Err(error) = artifacts::write_empty(&path) {
                warn!("cannot persist placeholder: {error}");
            }
            CrtOutcome::Empty
        }
        Err(error) => {
            counter!(FAILURES, &[failure_label(error.failure_kind())]).increment(1);
            warn!("current profile failed: {error}");
            if let Err(error) = artifacts::write_empty(&path) {
                warn!("cannot persist placeholder: {error}");
            }
            CrtOutcome::Empty
        }
    }
}

fn try_build_profile<S: WaveformStore>(
    context: &CycleContext<S>,
    tx: StationId,
    minute_end: DateTime<Utc>,
) -> Result<Option<CurrentProfile>, CycleError> {
    let calibration = calibration::for_station(&context.parameters.input_path, tx)?;
    let window_start = minute_end - Duration::minutes(context.parameters.stack_time_window);
    let Some(waveform) = context.store.fetch(tx, window_start, minute_end)? else {
        return Ok(None);
    };
    if waveform.sample_interval != calibration.sample_interval {
        warn!(
            station = tx,
            recorded = waveform.sample_interval,
            calibrated = calibration.sample_interval,
            "recording disagrees with calibration sample interval; using the recording"
        );
    }

    let boundaries = detect_boundaries(
        &waveform.samples,
        context.settings.window,
        context.settings.min_separation(),
    )?;
    let segments = extract_amplitudes(
        &waveform.samples,
        &boundaries,
        context.settings.z_threshold,
        context.settings.edge_margin,
        calibration.conversion_factor,
    );
    Ok(Some(CurrentProfile::new(
        waveform.start,
        waveform.sample_interval,
        segments,
    )))
}

/// Runs VSB → VPM → VSK for one (Tx, Rx) pair from a ready CRT artifact.
#[instrument(skip(context, crt_path))]
pub(crate) fn run_receiver_chain<S: WaveformStore>(
    context: &CycleContext<S>,
    tx: StationId,
    rx: StationId,
    crt_path: &std::path::Path,
    minute_end: DateTime<Utc>,
) -> Result<(), CycleError> {
    let pair = format!("{tx}-{rx}");
    let output = &context.parameters.output_path;
    let vsb_path = artifact_path(output, minute_end, &pair, "vsb");
    let vpm_path = artifact_path(output, minute_end, &pair, "vpm");
    let vsk_path = artifact_path(output, minute_end, &pair, "vsk");

    // Read the CRT fresh from disk: the file, not the producing task's
    // memory, is the interface between stages.
    let profile = CurrentProfile::read(crt_path)?;
    if profile.is_empty() {
        write_empty_chain(context, tx, rx, minute_end)?;
        return Ok(());
    }
    let calibration = calibration::for_station(&context.parameters.input_path, rx)?;

    let union = profile
        .windows()
        .fold(None::<(DateTime<Utc>, DateTime<Utc>)>, |union, (start, end)| {
            Some(match union {
                None => (start, end),
                Some((earliest, latest)) => (earliest.min(start), latest.max(end)),
            })
        });
    let receiver = match union {
        Some((start, end)) => context.store.fetch(rx, start, end)?,
        None => None,
    };
    if receiver.is_none() {
        warn!("no receiver coverage; voltages will be NaN");
    }

    let voltage = MatchedVoltage::derive(
        &profile,
        receiver.as_ref(),
        calibration.conversion_factor,
        context.settings.z_threshold,
    );
    voltage.write(&vsb_path)?;
    counter!(ARTIFACTS_WRITTEN, &[artifact_label(ArtifactKind::Vsb)]).increment(1);

    let voltage = MatchedVoltage::read(&vsb_path)?;
    let differential = DifferentialVoltage::derive(&voltage);
    differential.write(&vpm_path)?;
    counter!(ARTIFACTS_WRITTEN, &[artifact_label(ArtifactKind::Vpm)]).increment(1);

    let differential = DifferentialVoltage::read(&vpm_path)?;
    let profile = CurrentProfile::read(crt_path)?;
    match stacked::derive(&differential, &profile) {
        Some(value) => stacked::write(&vsk_path, value)?,
        None => artifacts::write_empty(&vsk_path)?,
    }
    counter!(ARTIFACTS_WRITTEN, &[artifact_label(ArtifactKind::Vsk)]).increment(1);
    info!("receiver chain complete");
    Ok(())
}

/// Structurally complete placeholders for a pair that cannot be computed.
pub(crate) fn write_empty_chain<S>(
    context: &CycleContext<S>,
    tx: StationId,
    rx: StationId,
    minute_end: DateTime<Utc>,
) -> Result<(), ArtifactError> {
    let pair = format!("{tx}-{rx}");
    for extension in ["vsb", "vpm", "vsk"] {
        let path = artifact_path(
            &context.parameters.output_path,
            minute_end,
            &pair,
            extension,
        );
        artifacts::write_empty(&path)?;
    }
    Ok(())
}
