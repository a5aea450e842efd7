//! The current profile (`.crt`): the segmentation of one transmitter
//! waveform over one stacking window.
use super::{ArtifactError, parse_profile, read_text, render_profile, write_text};
use crate::segmentation::SegmentAmplitude;
use chrono::{DateTime, Duration, Utc};
use em_survey_common::Real;
use std::path::Path;

/// Persisted form: header `YYYYMMDDHHMM,SS,<sample_interval>`, then one
/// `start,end,amplitude` row per segment. The header timestamp is the
/// absolute time of sample 0 of the segmented waveform, which anchors every
/// row's index pair in absolute time for the downstream stages.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CurrentProfile {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) sample_interval: Real,
    pub(crate) rows: Vec<ProfileRow>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ProfileRow {
    pub(crate) start: usize,
    pub(crate) end: usize,
    /// Scaled robust amplitude; exactly zero marks "no excitation".
    pub(crate) amplitude: Real,
}

impl CurrentProfile {
    pub(crate) fn new(
        timestamp: DateTime<Utc>,
        sample_interval: Real,
        segments: Vec<SegmentAmplitude>,
    ) -> Self {
        Self {
            timestamp,
            sample_interval,
            rows: segments
                .into_iter()
                .map(|entry| ProfileRow {
                    start: entry.segment.start,
                    end: entry.segment.end,
                    amplitude: entry.amplitude,
                })
                .collect(),
        }
    }

    /// A profile with no rows is a "no data" sentinel, not an error.
    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Absolute time of sample `index`, per this profile's own header.
    pub(crate) fn time_at(&self, index: usize) -> DateTime<Utc> {
        self.timestamp
            + Duration::microseconds((index as Real * self.sample_interval * 1e6).round() as i64)
    }

    /// Each row's `(start, end)` index pair as an absolute time window.
    pub(crate) fn windows(&self) -> impl Iterator<Item = (DateTime<Utc>, DateTime<Utc>)> + '_ {
        self.rows
            .iter()
            .map(|row| (self.time_at(row.start), self.time_at(row.end)))
    }

    pub(crate) fn write(&self, path: &Path) -> Result<(), ArtifactError> {
        let text = render_profile(
            self.timestamp,
            self.sample_interval,
            self.rows.iter().map(|row| (row.start, row.end, row.amplitude)),
        );
        write_text(path, &text)
    }

    pub(crate) fn read(path: &Path) -> Result<Self, ArtifactError> {
        let text = read_text(path)?;
        let (timestamp, sample_interval, rows) = parse_profile(path, &text)?;
        Ok(Self {
            timestamp,
            sample_interval,
            rows: rows
                .into_iter()
                .map(|(start, end, amplitude)| ProfileRow {
                    start,
                    end,
                    amplitude,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Segment;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn test_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("w2s-crt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(format!("{tag}.crt"))
    }

    fn profile() -> CurrentProfile {
        CurrentProfile::new(
            Utc.with_ymd_and_hms(2024, 6, 18, 6, 29, 57).unwrap(),
            0.001,
            vec![
                SegmentAmplitude {
                    segment: Segment { start: 13, end: 94 },
                    amplitude: 0.0,
                },
                SegmentAmplitude {
                    segment: Segment {
                        start: 103,
                        end: 194,
                    },
                    amplitude: 12.40625,
                },
                SegmentAmplitude {
                    segment: Segment {
                        start: 203,
                        end: 294,
                    },
                    amplitude: -12.337891,
                },
            ],
        )
    }

    #[test]
    fn file_round_trip_reproduces_rows_exactly() {
        let path = test_path("roundtrip");
        let written = profile();
        written.write(&path).unwrap();
        let read_back = CurrentProfile::read(&path).unwrap();
        assert_eq!(read_back, written);

        // Write-once discipline makes byte stability matter too.
        let first = std::fs::read(&path).unwrap();
        read_back.write(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn windows_derive_from_the_header_base() {
        let profile = profile();
        let (start, end) = profile.windows().nth(1).unwrap();
        assert_eq!(
            start,
            profile.timestamp + Duration::milliseconds(103)
        );
        assert_eq!(end, profile.timestamp + Duration::milliseconds(194));
    }

    #[test]
    fn headerless_file_is_malformed() {
        let path = test_path("empty");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            CurrentProfile::read(&path),
            Err(ArtifactError::Malformed { line: 1, .. })
        ));
    }
}
