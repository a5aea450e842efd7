//! The stacked scalar (`.vsk`): one resistivity-proportional ratio per
//! (transmitter, receiver, action-minute).
//!
//! Each differential voltage pairs with the current-amplitude step between
//! the matching CRT row and its successor (`vpm[i]` against
//! `crt[i] - crt[i+1]`; the offset convention is fixed here and nowhere
//! else). The scalar is the mean of the absolute ratios over the valid pairs,
//! signed by the polarity of the first usable differential against the first
//! actual excitation.
use super::{ArtifactError, format_signed, write_text};
use crate::artifacts::{current_profile::CurrentProfile, differential::DifferentialVoltage};
use em_survey_common::Real;
use std::path::Path;

/// Reduces the differential voltages to one signed scalar.
///
/// A pair is valid when the differential is finite and the current step is
/// in range and nonzero (zero steps separate two gap segments and carry no
/// excitation information). Returns None when no pair is valid — the caller
/// persists an explicitly empty artifact in that case.
pub(crate) fn derive(
    differential: &DifferentialVoltage,
    profile: &CurrentProfile,
) -> Option<Real> {
    let currents: Vec<Real> = profile.rows.iter().map(|row| row.amplitude).collect();

    let mut ratios = Vec::new();
    for (index, &value) in differential.values.iter().enumerate() {
        if !value.is_finite() {
            continue;
        }
        let Some((&current, &next)) = currents.get(index).zip(currents.get(index + 1)) else {
            continue;
        };
        let step = current - next;
        if step == 0.0 {
            continue;
        }
        ratios.push((value / step).abs());
    }
    if ratios.is_empty() {
        return None;
    }
    let magnitude = ratios.iter().sum::<Real>() / ratios.len() as Real;

    let differential_sign = differential
        .values
        .iter()
        .find(|value| value.is_finite())
        .map_or(1.0, |&value| if value >= 0.0 { 1.0 } else { -1.0 });
    let current_sign = currents
        .iter()
        .find(|&&amplitude| amplitude != 0.0)
        .map_or(1.0, |&amplitude| if amplitude >= 0.0 { 1.0 } else { -1.0 });

    Some(differential_sign * current_sign * magnitude)
}

/// A single sign-stamped line.
pub(crate) fn write(path: &Path, value: Real) -> Result<(), ArtifactError> {
    write_text(path, &format!("{}\n", format_signed(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::{Segment, SegmentAmplitude};
    use chrono::{TimeZone, Utc};

    fn profile_of(amplitudes: &[Real]) -> CurrentProfile {
        CurrentProfile::new(
            Utc.with_ymd_and_hms(2024, 6, 18, 6, 30, 0).unwrap(),
            0.01,
            amplitudes
                .iter()
                .enumerate()
                .map(|(index, &amplitude)| SegmentAmplitude {
                    segment: Segment {
                        start: index * 100,
                        end: index * 100 + 90,
                    },
                    amplitude,
                })
                .collect(),
        )
    }

    #[test]
    fn reduces_to_the_mean_absolute_ratio() {
        // Steps: 0-8=-8, 8-0=8, 0-(-8)=8; differentials 2, -2, 4.
        let profile = profile_of(&[0.0, 8.0, 0.0, -8.0]);
        let differential = DifferentialVoltage {
            values: vec![2.0, -2.0, 4.0],
        };
        let value = derive(&differential, &profile).unwrap();
        // Ratios 0.25, 0.25, 0.5; first differential positive, first nonzero
        // current positive.
        assert_eq!(value, (0.25 + 0.25 + 0.5) / 3.0);
    }

    #[test]
    fn sign_follows_first_usable_differential_and_first_excitation() {
        let profile = profile_of(&[0.0, -8.0, 0.0, 8.0]);
        let differential = DifferentialVoltage {
            values: vec![Real::NAN, -2.0, 4.0],
        };
        let value = derive(&differential, &profile).unwrap();
        // First finite differential is negative, first nonzero current is
        // negative: overall sign positive.
        assert!(value > 0.0, "value {value}");
    }

    #[test]
    fn nan_and_zero_step_pairs_are_skipped_not_fatal() {
        let profile = profile_of(&[0.0, 0.0, 8.0, 8.0, 0.0]);
        let differential = DifferentialVoltage {
            values: vec![1.0, Real::NAN, 3.0],
        };
        // Pair 0 has step 0-0=0, pair 1 is NaN; only pair 2 (8-8=0)...
        // every pair drops, so no scalar exists.
        assert_eq!(derive(&differential, &profile), None);
    }

    #[test]
    fn single_valid_pair_is_enough() {
        let profile = profile_of(&[0.0, 10.0, 0.0]);
        let differential = DifferentialVoltage {
            values: vec![-5.0],
        };
        // Step 0-10=-10, ratio 0.5; signs: differential -, current +.
        assert_eq!(derive(&differential, &profile), Some(-0.5));
    }

    #[test]
    fn empty_differential_yields_none() {
        let profile = profile_of(&[0.0, 10.0]);
        let differential = DifferentialVoltage { values: vec![] };
        assert_eq!(derive(&differential, &profile), None);
    }
}
