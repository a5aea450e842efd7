//! Runtime parameters for one survey deployment.
//!
//! Deployments ship a single JSON parameter file whose keys predate this
//! component, hence the SCREAMING_SNAKE_CASE naming on the wire.
use crate::StationId;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read parameter file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse parameter file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("parameter {0} must not be empty")]
    EmptyList(&'static str),
    #[error("action minute {0} is out of range 0..=59")]
    MinuteOutOfRange(u32),
    #[error("STACK_TIME_WINDOW must be a positive number of minutes, got {0}")]
    NonPositiveStackWindow(i64),
}

/// The deployment parameter set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Parameters {
    /// Root of the per-station recording tree.
    pub input_path: PathBuf,
    /// Directory receiving every derived artifact.
    pub output_path: PathBuf,
    /// Transmitter stations.
    pub tx_id: Vec<StationId>,
    /// Receiver stations.
    pub rx_id: Vec<StationId>,
    /// Trailing aggregation span, in minutes, segmented on each trigger.
    pub stack_time_window: i64,
    /// Minutes of the hour on which processing triggers.
    pub minutes_of_action: Vec<u32>,
}

impl Parameters {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parameters: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        parameters.validate()?;
        Ok(parameters)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tx_id.is_empty() {
            return Err(ConfigError::EmptyList("TX_ID"));
        }
        if self.rx_id.is_empty() {
            return Err(ConfigError::EmptyList("RX_ID"));
        }
        if self.minutes_of_action.is_empty() {
            return Err(ConfigError::EmptyList("MINUTES_OF_ACTION"));
        }
        if let Some(&minute) = self.minutes_of_action.iter().find(|&&minute| minute > 59) {
            return Err(ConfigError::MinuteOutOfRange(minute));
        }
        if self.stack_time_window <= 0 {
            return Err(ConfigError::NonPositiveStackWindow(self.stack_time_window));
        }
        Ok(())
    }
}
