//! Access to raw station recordings.
//!
//! Stations record independently, each on its own clock, into short chunk
//! files. The store hands the pipeline one contiguous [Waveform] per query
//! interval; where the recording came from (and in what format the recorder
//! wrote it) stays behind the [WaveformStore] seam.
pub(crate) mod directory;

use chrono::{DateTime, Utc};
use em_survey_common::{Real, StationId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("cannot read chunk {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed chunk {} line {line}: {reason}", path.display())]
    MalformedChunk {
        path: PathBuf,
        line: usize,
        reason: &'static str,
    },
}

/// One station's contiguous recording over some span. Immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Waveform {
    pub(crate) samples: Vec<Real>,
    /// Absolute time of the first sample.
    pub(crate) start: DateTime<Utc>,
    /// Seconds per sample.
    pub(crate) sample_interval: Real,
}

impl Waveform {
    /// Index of the sample nearest `time`, in this waveform's own index
    /// space. Negative when `time` precedes the recording.
    pub(crate) fn index_at(&self, time: DateTime<Utc>) -> i64 {
        let offset = (time - self.start)
            .num_microseconds()
            .unwrap_or(i64::MAX) as Real
            / 1e6;
        (offset / self.sample_interval).round() as i64
    }

    /// The samples spanning `[start_index, end_index)`, or None when the
    /// range is degenerate or reaches outside the recording.
    pub(crate) fn window(&self, start_index: i64, end_index: i64) -> Option<&[Real]> {
        if start_index < 0 || start_index >= end_index || end_index > self.samples.len() as i64 {
            return None;
        }
        self.samples.get(start_index as usize..end_index as usize)
    }
}

/// Where recordings come from.
///
/// `fetch` returns the station's samples overlapping the closed interval
/// `[start, end]`, concatenated in time order, with the absolute start of the
/// concatenation equal to the earliest covered sample. Absent coverage is an
/// expected condition in the field and comes back as `Ok(None)`, never as an
/// error.
pub(crate) trait WaveformStore {
    fn fetch(
        &self,
        station: StationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Waveform>, StoreError>;
}
