//! Reduces each plateau to a robust amplitude and an inward-trimmed span.
use super::{Segment, SegmentAmplitude, robust_mean::robust_mean};
use em_survey_common::Real;

/// Computes one [SegmentAmplitude] per plateau.
///
/// Plateaus are the spans between consecutive entries of
/// `[0] ++ boundaries`: the stretch before the first transition is a plateau
/// like any other, while the tail after the last transition is not emitted.
/// Each span is robust-reduced; its trimmed range pulls in `edge_margin`
/// samples past the outermost inliers to shed residual transient energy. A
/// span whose inlier set comes back empty is dropped outright rather than
/// emitted with nonsensical indices.
///
/// Afterwards, any amplitude smaller in magnitude than half the strongest is
/// forced to exactly zero: those spans are inter-cycle gaps with no injected
/// current, and zero is their sentinel.
pub(crate) fn extract_amplitudes(
    data: &[Real],
    boundaries: &[usize],
    z_threshold: Real,
    edge_margin: usize,
    conversion_factor: Real,
) -> Vec<SegmentAmplitude> {
    let mut output = Vec::with_capacity(boundaries.len());
    let starts = std::iter::once(0).chain(boundaries.iter().copied());
    for (from, to) in starts.zip(boundaries.iter().copied()) {
        if to > data.len() || from >= to {
            continue;
        }
        let Ok(reduced) = robust_mean(&data[from..to], z_threshold) else {
            continue;
        };
        let (Some(&first_inlier), Some(&last_inlier)) =
            (reduced.inliers.first(), reduced.inliers.last())
        else {
            continue;
        };
        output.push(SegmentAmplitude {
            segment: Segment {
                start: from + first_inlier + edge_margin,
                end: (from + last_inlier).saturating_sub(edge_margin),
            },
            amplitude: reduced.mean * conversion_factor,
        });
    }

    let max_abs = output
        .iter()
        .map(|entry| entry.amplitude.abs())
        .fold(0.0, Real::max);
    for entry in &mut output {
        if entry.amplitude.abs() < max_abs / 2.0 {
            entry.amplitude = 0.0;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::boundary::detect_boundaries;

    #[test]
    fn five_plateau_vector_end_to_end() {
        let data = [
            0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 0.0, 0.0, 0.0, -10.0, -10.0, -10.0, 0.0, 0.0, 0.0,
        ];
        let boundaries = detect_boundaries(&data, 3, 3).unwrap();
        let amplitudes = extract_amplitudes(&data, &boundaries, 3.0, 3, 1.0);
        assert_eq!(
            amplitudes
                .iter()
                .map(|entry| entry.amplitude)
                .collect::<Vec<_>>(),
            vec![0.0, 10.0, 0.0, -10.0]
        );
    }

    #[test]
    fn weak_amplitudes_zero_against_half_the_maximum() {
        // Plateaus at 100, 45 and -60: 45 sits under half of 100 and must
        // become exactly zero; -60 must survive.
        let mut data = Vec::new();
        data.extend(std::iter::repeat_n(100.0, 50));
        data.extend(std::iter::repeat_n(45.0, 50));
        data.extend(std::iter::repeat_n(-60.0, 50));
        data.extend(std::iter::repeat_n(0.0, 50));
        let boundaries = detect_boundaries(&data, 10, 10).unwrap();
        let amplitudes = extract_amplitudes(&data, &boundaries, 3.0, 3, 1.0);
        let max_abs = amplitudes
            .iter()
            .map(|entry| entry.amplitude.abs())
            .fold(0.0, f64::max);
        for entry in &amplitudes {
            assert!(
                entry.amplitude == 0.0 || entry.amplitude.abs() >= max_abs / 2.0,
                "amplitude {} not zeroed against max {max_abs}",
                entry.amplitude
            );
        }
        assert!(amplitudes.iter().any(|entry| entry.amplitude == 100.0));
        assert!(amplitudes.iter().any(|entry| entry.amplitude == -60.0));
    }

    #[test]
    fn conversion_factor_scales_amplitudes() {
        let mut data = Vec::new();
        data.extend(std::iter::repeat_n(0.0, 40));
        data.extend(std::iter::repeat_n(50.0, 40));
        data.extend(std::iter::repeat_n(0.0, 40));
        let boundaries = detect_boundaries(&data, 10, 10).unwrap();
        let amplitudes = extract_amplitudes(&data, &boundaries, 3.0, 3, 0.25);
        assert!(amplitudes.iter().any(|entry| entry.amplitude == 12.5));
    }

    #[test]
    fn trimmed_range_pulls_in_from_the_edges() {
        let mut data = Vec::new();
        data.extend(std::iter::repeat_n(0.0, 40));
        data.extend(std::iter::repeat_n(80.0, 40));
        data.extend(std::iter::repeat_n(0.0, 40));
        let boundaries = detect_boundaries(&data, 10, 10).unwrap();
        let amplitudes = extract_amplitudes(&data, &boundaries, 3.0, 3, 1.0);
        for entry in &amplitudes {
            let Segment { start, end } = entry.segment;
            assert!(start >= 3);
            assert!(end <= data.len());
            assert!(start < end, "segment {start}..{end} collapsed");
        }
    }

    #[test]
    fn boundary_past_data_end_is_skipped() {
        let data = vec![1.0; 10];
        let amplitudes = extract_amplitudes(&data, &[4, 20], 3.0, 0, 1.0);
        assert_eq!(amplitudes.len(), 1);
        assert_eq!(amplitudes.first().unwrap().segment, Segment { start: 0, end: 3 });
    }
}
