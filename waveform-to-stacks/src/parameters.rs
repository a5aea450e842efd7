//! Tunable settings for the segmentation stages.
//!
//! Deployments differ in recorder rate and switching cadence, so everything a
//! site might need to adjust is configuration rather than a code variant.
use clap::Parser;
use em_survey_common::Real;

/// Settings applied to every station's segmentation.
#[derive(Debug, Clone, Parser)]
pub(crate) struct SegmentationSettings {
    /// Width, in samples, of the slope-estimation window.
    #[clap(long, default_value = "10")]
    pub(crate) window: usize,

    /// Z-score at which a sample is excluded from a segment's mean.
    #[clap(long, default_value = "3.0")]
    pub(crate) z_threshold: Real,

    /// Samples discarded at each end of a segment's inlier range, where
    /// switching transients linger.
    #[clap(long, default_value = "3")]
    pub(crate) edge_margin: usize,

    /// Candidate boundaries closer than this merge into one. Defaults to the
    /// slope window width.
    #[clap(long)]
    pub(crate) min_separation: Option<usize>,
}

impl SegmentationSettings {
    pub(crate) fn min_separation(&self) -> usize {
        self.min_separation.unwrap_or(self.window)
    }
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            window: 10,
            z_threshold: 3.0,
            edge_margin: 3,
            min_separation: None,
        }
    }
}
