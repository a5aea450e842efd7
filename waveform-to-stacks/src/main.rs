//! # Waveform to Stacks
//!
//! The Waveform to Stacks component performs the following functions:
//! * Watches the wall clock and triggers on each configured action-minute.
//! * Segments every transmitter's recording over the trailing stacking
//!   window into stable plateaus and persists the current profile (CRT).
//! * For every (transmitter, receiver) pair, matches the profile's time
//!   windows against the receiver's own recording and cascades the result
//!   through the matched voltage (VSB), differential voltage (VPM) and
//!   stacked scalar (VSK) artifacts.
//! * Degrades per pair: whatever cannot be computed still leaves an
//!   explicitly empty artifact, so the output tree stays structurally
//!   complete for downstream consumers.
mod artifacts;
mod cascade;
mod parameters;
mod scheduler;
mod segmentation;
mod store;

use cascade::CycleContext;
use chrono::{Timelike, Utc};
use clap::Parser;
use em_survey_common::{
    config::Parameters,
    metrics::{
        component_info_metric,
        names::{ARTIFACTS_WRITTEN, FAILURES, LAST_CYCLE_TIMESTAMP, MINUTES_PROCESSED},
    },
};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use miette::IntoDiagnostic;
use parameters::SegmentationSettings;
use scheduler::MinuteGate;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use store::directory::DirectoryStore;
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
};
use tracing::{debug, info, warn};

/// [clap] derived struct to handle command line parameters.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Path of the deployment parameter file (JSON).
    #[clap(long)]
    parameters: PathBuf,

    /// How often to check the wall clock against the action-minutes.
    #[clap(long, default_value = "20")]
    poll_interval_secs: u64,

    /// Upper bound, in seconds, on how long a receiver task waits for its
    /// transmitter's current profile.
    #[clap(long, default_value = "300")]
    crt_wait_cap_secs: u64,

    /// Endpoint on which OpenMetrics flavour metrics are available.
    #[clap(long, env, default_value = "127.0.0.1:9090")]
    observability_address: SocketAddr,

    #[clap(flatten)]
    segmentation: SegmentationSettings,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = Cli::parse();

    em_survey_common::init_tracing();

    let parameters = Parameters::from_file(&args.parameters).into_diagnostic()?;
    info!(
        tx = ?parameters.tx_id,
        rx = ?parameters.rx_id,
        minutes = ?parameters.minutes_of_action,
        "parameters loaded"
    );

    // Install exporter and register metrics
    let builder = PrometheusBuilder::new();
    builder
        .with_http_listener(args.observability_address)
        .install()
        .into_diagnostic()?;

    describe_counter!(
        MINUTES_PROCESSED,
        metrics::Unit::Count,
        "Number of action-minutes processed"
    );
    describe_counter!(
        ARTIFACTS_WRITTEN,
        metrics::Unit::Count,
        "Number of artifacts written, by kind"
    );
    describe_counter!(
        FAILURES,
        metrics::Unit::Count,
        "Number of failures encountered, by kind"
    );
    describe_gauge!(
        LAST_CYCLE_TIMESTAMP,
        "Wall-clock timestamp of the last completed cycle"
    );

    let context = Arc::new(CycleContext {
        store: DirectoryStore::new(parameters.input_path.clone()),
        settings: args.segmentation,
        crt_wait_cap: Duration::from_secs(args.crt_wait_cap_secs),
        parameters,
    });
    let mut gate = MinuteGate::new(&context.parameters.minutes_of_action);
    let mut poll = tokio::time::interval(Duration::from_secs(args.poll_interval_secs.max(1)));

    // Is used to await any sigint signals
    let mut sigint = signal(SignalKind::interrupt()).into_diagnostic()?;

    component_info_metric("waveform-to-stacks");

    loop {
        select! {
            _ = poll.tick() => {
                let now = Utc::now();
                let Some(minute) = gate.observe(now) else {
                    debug!(minute = now.minute(), "not an armed action-minute");
                    continue;
                };
                info!(minute, "action-minute reached, processing");
                let minute_end = now
                    .with_second(0)
                    .and_then(|now| now.with_nanosecond(0))
                    .unwrap_or(now);
                scheduler::process_minute(context.clone(), minute_end).await;
                counter!(MINUTES_PROCESSED).increment(1);
                gauge!(LAST_CYCLE_TIMESTAMP).set(now.timestamp() as f64);
            }
            _ = sigint.recv() => {
                warn!("interrupt received, shutting down");
                return Ok(());
            }
        }
    }
}
