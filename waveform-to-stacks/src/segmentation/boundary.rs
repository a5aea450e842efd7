//! Locates the transitions between stable plateaus of a square-wave signal.
use super::SegmentationError;
use em_survey_common::Real;
use std::collections::HashSet;

/// Finds the sample indices at which the signal switches plateau.
///
/// The signal is reduced to a smoothed forward-minus-backward slope, slope
/// values small against the strongest transition are zeroed, and the local
/// extrema of what remains mark the transitions. Candidates closer together
/// than `min_separation` are near-duplicate detections of one transition
/// (background-field drift splits extrema); the earlier of each close pair is
/// dropped.
///
/// Returns strictly increasing indices. Fails with
/// [SegmentationError::InsufficientData] when `data` is shorter than
/// `2 * window + 1`.
pub(crate) fn detect_boundaries(
    data: &[Real],
    window: usize,
    min_separation: usize,
) -> Result<Vec<usize>, SegmentationError> {
    let needed = 2 * window + 1;
    if data.len() < needed {
        return Err(SegmentationError::InsufficientData {
            got: data.len(),
            needed,
        });
    }

    let mut slope = smoothed_difference(data, window);
    let half_max = slope.iter().copied().fold(Real::NEG_INFINITY, Real::max) / 2.0;
    for value in &mut slope {
        if value.abs() < half_max {
            *value = 0.0;
        }
    }

    // The slope is only a slope up to data.len() - window; past that the
    // fallback carries raw window means, which never mark a transition.
    let candidates = extremum_candidates(&slope, data.len() - window);
    Ok(merge_close(candidates, min_separation))
}

/// Difference between the mean of the window ahead of `i` and the mean of the
/// window at `i`, padded at the front so index `i` lines up with sample `i`.
///
/// Where no full forward window exists, the mean of the backward window
/// stands in.
fn smoothed_difference(data: &[Real], window: usize) -> Vec<Real> {
    let mean_of = |from: usize, to: usize| -> Real {
        data[from..to].iter().sum::<Real>() / (to - from) as Real
    };

    let num_windows = data.len() - window + 1;
    let mut raw = Vec::with_capacity(num_windows);
    for i in 0..num_windows {
        let value = if i + 2 * window <= data.len() {
            mean_of(i + window, i + 2 * window) - mean_of(i, i + window)
        } else {
            mean_of(i, i + window)
        };
        raw.push(value);
    }

    let padding = raw.iter().sum::<Real>() / raw.len() as Real;
    let mut slope = Vec::with_capacity(window + raw.len());
    slope.extend(std::iter::repeat_n(padding, window));
    slope.extend(raw);
    slope
}

/// Local extrema of the thresholded slope, restricted to `1..=limit`.
///
/// Runs of equal values count as one extremum and contribute both endpoints:
/// on clean signals whose plateaus are short relative to the window, two
/// back-to-back transitions flatten into a single extremum run, and its
/// endpoints are exactly those transitions. (Equal values genuinely occur
/// here; the zeroing step manufactures them and flat data produces them.)
fn extremum_candidates(slope: &[Real], limit: usize) -> Vec<usize> {
    let mut runs: Vec<(usize, usize, Real)> = Vec::new();
    for (index, &value) in slope.iter().enumerate() {
        match runs.last_mut() {
            Some((_, last, run_value)) if *run_value == value => *last = index,
            _ => runs.push((index, index, value)),
        }
    }

    let mut candidates = Vec::new();
    for triple in runs.windows(3) {
        let [(_, _, previous), (first, last, value), (_, _, next)] = triple else {
            continue;
        };
        if (value - previous) * (next - value) < 0.0 {
            for index in [*first, *last] {
                if (1..=limit).contains(&index) && candidates.last() != Some(&index) {
                    candidates.push(index);
                }
            }
        }
    }
    candidates
}

/// Drops the earlier of every candidate pair closer than `min_separation`.
fn merge_close(candidates: Vec<usize>, min_separation: usize) -> Vec<usize> {
    let dropped: HashSet<usize> = candidates
        .windows(2)
        .filter(|pair| pair[1] - pair[0] < min_separation)
        .map(|pair| pair[0])
        .collect();
    candidates
        .into_iter()
        .filter(|candidate| !dropped.contains(candidate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_short_input_fails() {
        let data = vec![0.0; 20];
        assert_eq!(
            detect_boundaries(&data, 10, 10),
            Err(SegmentationError::InsufficientData {
                got: 20,
                needed: 21
            })
        );
    }

    #[test]
    fn five_plateau_vector_yields_four_boundaries() {
        let data = [
            0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 0.0, 0.0, 0.0, -10.0, -10.0, -10.0, 0.0, 0.0, 0.0,
        ];
        let boundaries = detect_boundaries(&data, 3, 3).unwrap();
        assert_eq!(boundaries, vec![3, 6, 9, 12]);
    }

    #[test]
    fn clean_square_wave_boundaries_recovered_within_one_sample() {
        // 40-sample plateaus of alternating polarity, transitions at
        // multiples of 40.
        let mut data = Vec::new();
        for cycle in 0..4 {
            let level = if cycle % 2 == 0 { 80.0 } else { -80.0 };
            data.extend(std::iter::repeat_n(level, 40));
        }
        let boundaries = detect_boundaries(&data, 10, 10).unwrap();
        assert_eq!(boundaries.len(), 3);
        for (found, expected) in boundaries.iter().zip([40usize, 80, 120]) {
            assert!(
                found.abs_diff(expected) <= 1,
                "boundary {found} not within 1 of {expected}"
            );
        }
    }

    #[test]
    fn noisy_square_wave_boundaries_recovered() {
        use rand::{Rng, SeedableRng, rngs::StdRng};
        let mut rng = StdRng::seed_from_u64(5);
        let mut data = Vec::new();
        for cycle in 0..4 {
            let level = if cycle % 2 == 0 { 100.0 } else { -100.0 };
            data.extend((0..60).map(|_| level + rng.random_range(-1.0..1.0)));
        }
        let boundaries = detect_boundaries(&data, 10, 10).unwrap();
        assert_eq!(boundaries.len(), 3, "boundaries: {boundaries:?}");
        for (found, expected) in boundaries.iter().zip([60usize, 120, 180]) {
            assert!(
                found.abs_diff(expected) <= 2,
                "boundary {found} not near {expected}"
            );
        }
    }

    #[test]
    fn near_duplicate_candidates_merge_to_the_later() {
        assert_eq!(merge_close(vec![10, 12, 40], 5), vec![12, 40]);
        assert_eq!(merge_close(vec![10, 12, 14, 40], 5), vec![14, 40]);
        assert_eq!(merge_close(vec![10, 15, 40], 5), vec![10, 15, 40]);
    }

    #[test]
    fn flat_input_finds_no_boundaries() {
        let data = vec![3.0; 100];
        assert_eq!(detect_boundaries(&data, 10, 10).unwrap(), Vec::<usize>::new());
    }
}
