//! Per-station acquisition calibration.
//!
//! Each station deposits an `acq.csv` alongside its recordings with the
//! columns `ID,conversion_factor,sample_interval`. The conversion factor
//! scales raw recorder counts to physical volts or amperes; the sample
//! interval is the recorder's nominal seconds-per-sample and is cross-checked
//! against the recording headers by the pipeline.
use crate::{Real, StationId};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("cannot read calibration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("calibration file {} line {line}: expected `ID,conversion_factor,sample_interval`", path.display())]
    MalformedRow { path: PathBuf, line: usize },
    #[error("station {station} has no row in {}", path.display())]
    UnknownStation { station: StationId, path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Scales raw recorder counts to physical units.
    pub conversion_factor: Real,
    /// Nominal seconds per sample.
    pub sample_interval: Real,
}

/// Looks `station` up in `<input_path>/<station>/acq.csv`.
pub fn for_station(input_path: &Path, station: StationId) -> Result<Calibration, CalibrationError> {
    let path = input_path.join(station.to_string()).join("acq.csv");
    let text = fs::read_to_string(&path).map_err(|source| CalibrationError::Read {
        path: path.clone(),
        source,
    })?;

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("ID") {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let row = fields
            .next()
            .zip(fields.next())
            .zip(fields.next())
            .map(|((id, factor), interval)| (id, factor, interval));
        let Some((id, factor, interval)) = row else {
            return Err(CalibrationError::MalformedRow {
                path,
                line: index + 1,
            });
        };
        let parsed = id
            .parse::<StationId>()
            .ok()
            .zip(factor.parse::<Real>().ok())
            .zip(interval.parse::<Real>().ok());
        let Some(((id, conversion_factor), sample_interval)) = parsed else {
            return Err(CalibrationError::MalformedRow {
                path,
                line: index + 1,
            });
        };
        if id == station {
            return Ok(Calibration {
                conversion_factor,
                sample_interval,
            });
        }
    }
    Err(CalibrationError::UnknownStation { station, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_table(tag: &str, content: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("acq-{}-{}", tag, std::process::id()));
        let station_dir = root.join("42");
        fs::create_dir_all(&station_dir).unwrap();
        fs::write(station_dir.join("acq.csv"), content).unwrap();
        root
    }

    #[test]
    fn station_row_is_found() {
        let root = write_table(
            "found",
            "ID,conversion_factor,sample_interval\n41,2.0,0.01\n42, 0.5, 0.001\n",
        );
        let calibration = for_station(&root, 42).unwrap();
        assert_eq!(
            calibration,
            Calibration {
                conversion_factor: 0.5,
                sample_interval: 0.001,
            }
        );
    }

    #[test]
    fn missing_station_is_reported() {
        let root = write_table("missing", "ID,conversion_factor,sample_interval\n41,2.0,0.01\n");
        assert!(matches!(
            for_station(&root, 42),
            Err(CalibrationError::UnknownStation { station: 42, .. })
        ));
    }

    #[test]
    fn malformed_row_is_reported() {
        let root = write_table("malformed", "ID,conversion_factor,sample_interval\n42,oops,0.01\n");
        assert!(matches!(
            for_station(&root, 42),
            Err(CalibrationError::MalformedRow { line: 2, .. })
        ));
    }
}
