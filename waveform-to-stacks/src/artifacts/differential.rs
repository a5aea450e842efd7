//! The differential voltage (`.vpm`): half-cycle voltage differences.
//!
//! Entry `i` compares VSB row `i` with row `i + 2` — the plateau of the same
//! polarity one full excitation cycle later — cancelling slow background
//! drift. A NaN anywhere in a pair makes a NaN entry; entries are never
//! compacted, because VSK pairs them back against CRT rows by position.
use super::{ArtifactError, format_signed, parse_signed, read_text, write_text};
use crate::artifacts::matched_voltage::MatchedVoltage;
use em_survey_common::Real;
use std::path::Path;

/// Exactly `N - 2` values for an `N`-row VSB (empty when `N < 3`).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DifferentialVoltage {
    pub(crate) values: Vec<Real>,
}

impl DifferentialVoltage {
    pub(crate) fn derive(voltage: &MatchedVoltage) -> Self {
        let values = voltage
            .rows
            .windows(3)
            .map(|span| {
                let current = span.first().map_or(Real::NAN, |row| row.voltage);
                let next_cycle = span.last().map_or(Real::NAN, |row| row.voltage);
                current - next_cycle
            })
            .collect();
        Self { values }
    }

    /// One sign-stamped value (or `NaN`) per line.
    pub(crate) fn write(&self, path: &Path) -> Result<(), ArtifactError> {
        let mut text = String::new();
        for value in &self.values {
            text.push_str(&format_signed(*value));
            text.push('\n');
        }
        write_text(path, &text)
    }

    pub(crate) fn read(path: &Path) -> Result<Self, ArtifactError> {
        let text = read_text(path)?;
        let mut values = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            values.push(parse_signed(path, index + 1, line)?);
        }
        Ok(Self { values })
    }
}
