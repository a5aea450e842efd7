//! The matched voltage (`.vsb`): the CRT's segment windows re-resolved
//! against a receiver's own recording.
//!
//! Transmitter and receiver run on independent clocks, so a segment's sample
//! indices mean nothing on the receiver side. Each CRT row is first converted
//! to an absolute time window using the CRT's *own* header, then that window
//! is located in the receiver waveform's *own* index space. A window the
//! receiver did not cover yields NaN in place, never a dropped row: every
//! downstream stage aligns to the CRT by position.
use super::{ArtifactError, parse_profile, read_text, render_profile, write_text};
use crate::{
    artifacts::current_profile::CurrentProfile,
    segmentation::robust_mean::robust_mean,
    store::Waveform,
};
use chrono::{DateTime, Utc};
use em_survey_common::Real;
use std::path::Path;

/// Structurally a [CurrentProfile] with the amplitude column replaced by a
/// matched receiver voltage, so it is position-aligned to its source CRT by
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MatchedVoltage {
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) sample_interval: Real,
    pub(crate) rows: Vec<VoltageRow>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VoltageRow {
    /// The source CRT row's index pair, copied verbatim.
    pub(crate) start: usize,
    pub(crate) end: usize,
    /// Robust mean voltage over the matching receiver window, scaled by the
    /// receiver conversion factor; NaN where the receiver has no coverage.
    pub(crate) voltage: Real,
}

impl MatchedVoltage {
    /// Derives the matched voltage for one (CRT, receiver waveform) pair.
    ///
    /// `receiver` is None when the store had no coverage at all; every row
    /// then carries NaN, keeping the artifact structurally complete.
    pub(crate) fn derive(
        profile: &CurrentProfile,
        receiver: Option<&Waveform>,
        conversion_factor: Real,
        z_threshold: Real,
    ) -> Self {
        let rows = profile
            .rows
            .iter()
            .map(|row| {
                let voltage = receiver
                    .and_then(|waveform| {
                        let start_index = waveform.index_at(profile.time_at(row.start));
                        let end_index = waveform.index_at(profile.time_at(row.end));
                        waveform.window(start_index, end_index)
                    })
                    .and_then(|window| robust_mean(window, z_threshold).ok())
                    .map_or(Real::NAN, |reduced| reduced.mean * conversion_factor);
                VoltageRow {
                    start: row.start,
                    end: row.end,
                    voltage,
                }
            })
            .collect();
        Self {
            timestamp: profile.timestamp,
            sample_interval: profile.sample_interval,
            rows,
        }
    }

    pub(crate) fn write(&self, path: &Path) -> Result<(), ArtifactError> {
        let text = render_profile(
            self.timestamp,
            self.sample_interval,
            self.rows.iter().map(|row| (row.start, row.end, row.voltage)),
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
                .map(|(start, end, voltage)| VoltageRow {
                    start,
                    end,
                    voltage,
                })
                .collect(),
        })
    }
}
