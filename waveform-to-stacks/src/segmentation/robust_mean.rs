//! Outlier-robust reduction of a noisy sample window to one value.
use super::SegmentationError;
use em_survey_common::Real;

/// Result of [robust_mean]: the inlier mean and which indices contributed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RobustMean {
    /// Mean over the inliers. NaN when the threshold excluded every sample.
    pub(crate) mean: Real,
    /// Indices into the input that passed the z-score cut, ascending.
    pub(crate) inliers: Vec<usize>,
}

/// Mean of `data` after discarding samples whose z-score reaches `threshold`.
///
/// The z-score is taken against the population standard deviation of the
/// whole window. Zero-variance input defeats the z-score (0/0 everywhere), so
/// it is treated as all-inlier and the plain mean is returned. The result is
/// deterministic for a given input.
pub(crate) fn robust_mean(data: &[Real], threshold: Real) -> Result<RobustMean, SegmentationError> {
    if data.is_empty() {
        return Err(SegmentationError::InsufficientData { got: 0, needed: 1 });
    }
    let count = data.len() as Real;
    let mean = data.iter().sum::<Real>() / count;
    let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<Real>() / count;
    let std = variance.sqrt();
    if std == 0.0 {
        return Ok(RobustMean {
            mean,
            inliers: (0..data.len()).collect(),
        });
    }

    let inliers: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, x)| ((*x - mean) / std).abs() < threshold)
        .map(|(index, _)| index)
        .collect();
    if inliers.is_empty() {
        return Ok(RobustMean {
            mean: Real::NAN,
            inliers,
        });
    }
    let inlier_mean = inliers.iter().map(|&index| data[index]).sum::<Real>() / inliers.len() as Real;
    Ok(RobustMean {
        mean: inlier_mean,
        inliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn empty_input_fails() {
        assert_eq!(
            robust_mean(&[], 3.0),
            Err(SegmentationError::InsufficientData { got: 0, needed: 1 })
        );
    }

    #[test]
    fn zero_variance_returns_plain_mean() {
        let data = vec![7.5; 16];
        let result = robust_mean(&data, 3.0).unwrap();
        assert_eq!(result.mean, 7.5);
        assert_eq!(result.inliers, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn single_spike_is_rejected() {
        let mut data = vec![10.0; 20];
        data.push(1000.0);
        let result = robust_mean(&data, 3.0).unwrap();
        assert_approx_eq!(result.mean, 10.0);
        assert_eq!(result.inliers, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn gaussian_noise_keeps_most_samples() {
        use rand::{Rng, SeedableRng, rngs::StdRng};
        let mut rng = StdRng::seed_from_u64(11);
        let data: Vec<Real> = (0..500)
            .map(|_| 5.0 + rng.random_range(-0.5..0.5))
            .collect();
        let result = robust_mean(&data, 3.0).unwrap();
        assert!(result.inliers.len() >= 490);
        assert_approx_eq!(result.mean, 5.0, 0.1);
    }

    #[test]
    fn impossible_threshold_yields_nan_and_no_inliers() {
        let data = [0.0, 1.0, 0.0, 1.0];
        let result = robust_mean(&data, 0.0).unwrap();
        assert!(result.mean.is_nan());
        assert!(result.inliers.is_empty());
    }
}
