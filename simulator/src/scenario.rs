//! Scenario description, created from the configuration JSON file.
use chrono::{DateTime, Utc};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("invalid noise distribution: {0}")]
    NoiseDistribution(#[from] rand_distr::NormalError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Scenario {
    /// Absolute time of the first sample of every station.
    pub(crate) start: DateTime<Utc>,
    /// Total span to generate, in minutes.
    pub(crate) span_minutes: u32,
    /// Length of each chunk file, in seconds.
    pub(crate) chunk_seconds: u32,
    /// Seconds per sample.
    pub(crate) sample_interval: f64,
    pub(crate) stations: Vec<StationScenario>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct StationScenario {
    pub(crate) id: em_survey_common::StationId,
    pub(crate) conversion_factor: f64,
    /// Peak excitation level, in raw recorder counts.
    pub(crate) amplitude: f64,
    /// Length of each excitation plateau, in samples.
    pub(crate) plateau_samples: usize,
    /// Length of the zero-current gap between plateaus, in samples.
    pub(crate) gap_samples: usize,
    /// Standard deviation of the additive Gaussian noise.
    pub(crate) noise_sd: f64,
    /// Slow background drift added per sample.
    pub(crate) drift_per_sample: f64,
}

impl StationScenario {
    /// One full span of samples: gap, positive plateau, gap, negative
    /// plateau, repeating, with noise and drift on top.
    pub(crate) fn generate(
        &self,
        scenario: &Scenario,
        rng: &mut impl rand::Rng,
    ) -> Result<Vec<f64>, ScenarioError> {
        let total =
            (f64::from(scenario.span_minutes) * 60.0 / scenario.sample_interval).round() as usize;
        let noise = Normal::new(0.0, self.noise_sd)?;
        let cycle = 2 * (self.gap_samples + self.plateau_samples);

        let mut samples = Vec::with_capacity(total);
        for index in 0..total {
            let phase = index % cycle.max(1);
            let level = if phase < self.gap_samples {
                0.0
            } else if phase < self.gap_samples + self.plateau_samples {
                self.amplitude
            } else if phase < 2 * self.gap_samples + self.plateau_samples {
                0.0
            } else {
                -self.amplitude
            };
            let drift = self.drift_per_sample * index as f64;
            samples.push(level + drift + noise.sample(rng));
        }
        Ok(samples)
    }
}
