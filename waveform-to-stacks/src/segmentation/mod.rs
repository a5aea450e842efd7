//! Turns one continuous waveform into stable plateau segments, each carrying
//! a robust amplitude.
//!
//! A transmitter injects an approximate square wave: flat excitation plateaus
//! of alternating polarity, separated by switching transients and inter-cycle
//! gaps. [boundary] locates the transitions, [amplitude] reduces each plateau
//! to one representative value, and [robust_mean] is the statistical primitive
//! both lean on.
pub(crate) mod amplitude;
pub(crate) mod boundary;
pub(crate) mod robust_mean;

use em_survey_common::Real;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SegmentationError {
    #[error("not enough samples: got {got}, need at least {needed}")]
    InsufficientData { got: usize, needed: usize },
}

/// Index span of one stable plateau, in waveform samples.
///
/// Spans are produced in time order and do not overlap. Aggressive edge
/// trimming can leave `start >= end`; such spans are carried through and
/// resolve to NaN when a voltage is matched against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

/// One plateau's trimmed span and its scaled robust amplitude.
///
/// An amplitude of exactly zero means "no excitation detected", not a
/// measured zero; see [amplitude::extract_amplitudes].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SegmentAmplitude {
    pub(crate) segment: Segment,
    pub(crate) amplitude: Real,
}
