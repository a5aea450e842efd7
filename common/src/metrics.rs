//! Metric names and label helpers shared by the pipeline binaries.
pub const METRIC_NAME_PREFIX: &str = "em_survey_";

pub mod names {
    use super::METRIC_NAME_PREFIX;
    use const_format::concatcp;

    pub const MINUTES_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "minutes_processed");
    pub const ARTIFACTS_WRITTEN: &str = concatcp!(METRIC_NAME_PREFIX, "artifacts_written");
    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const LAST_CYCLE_TIMESTAMP: &str = concatcp!(METRIC_NAME_PREFIX, "last_cycle_timestamp");
    pub const COMPONENT_INFO: &str = concatcp!(METRIC_NAME_PREFIX, "component_info");
}

/// Publishes a constant gauge labelled with the component's name, so a
/// scraper can tell which binaries are up.
pub fn component_info_metric(component: &'static str) {
    metrics::gauge!(names::COMPONENT_INFO, "component" => component).set(1.0);
}

pub mod failures {
    /// The failure classes worth distinguishing on a dashboard.
    #[derive(Clone, Copy, Debug)]
    pub enum FailureKind {
        /// The transmitter recorded nothing in the stacking window.
        NoTxCoverage,
        /// A current profile did not become available in time.
        CrtTimeout,
        /// Segmentation could not run (too little data).
        SegmentationFailed,
        /// The waveform store returned an error.
        StoreError,
        /// An artifact could not be written or re-read.
        ArtifactError,
        /// A station's calibration row was missing or malformed.
        CalibrationError,
    }

    pub fn get_label(kind: FailureKind) -> (&'static str, String) {
        let value = match kind {
            FailureKind::NoTxCoverage => "no_tx_coverage",
            FailureKind::CrtTimeout => "crt_timeout",
            FailureKind::SegmentationFailed => "segmentation_failed",
            FailureKind::StoreError => "store_error",
            FailureKind::ArtifactError => "artifact_error",
            FailureKind::CalibrationError => "calibration_error",
        };
        ("failure_kind", value.to_string())
    }
}

pub mod artifacts {
    /// The four cascading artifact kinds.
    #[derive(Clone, Copy, Debug)]
    pub enum ArtifactKind {
        Crt,
        Vsb,
        Vpm,
        Vsk,
    }

    pub fn get_label(kind: ArtifactKind) -> (&'static str, String) {
        let value = match kind {
            ArtifactKind::Crt => "crt",
            ArtifactKind::Vsb => "vsb",
            ArtifactKind::Vpm => "vpm",
            ArtifactKind::Vsk => "vsk",
        };
        ("artifact", value.to_string())
    }
}
