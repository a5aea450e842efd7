//! # Simulator
//!
//! Writes a synthetic station input tree — square-wave chunk recordings plus
//! per-station `acq.csv` calibration files — in the layout the pipeline
//! consumes, so the whole chain can be exercised without field hardware.
mod scenario;

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use miette::IntoDiagnostic;
use rand::SeedableRng;
use rand::rngs::StdRng;
use scenario::{Scenario, StationScenario};
use std::{fs, path::PathBuf};
use tracing::info;

/// [clap] derived struct to handle command line parameters.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Path of the scenario description (JSON).
    #[clap(long)]
    scenario: PathBuf,

    /// Directory to write the station tree into.
    #[clap(long)]
    output: PathBuf,

    /// Seed for the noise generator; random when omitted.
    #[clap(long)]
    seed: Option<u64>,
}

fn main() -> miette::Result<()> {
    let args = Cli::parse();

    em_survey_common::init_tracing();

    let text = fs::read_to_string(&args.scenario).into_diagnostic()?;
    let scenario: Scenario = serde_json::from_str(&text).into_diagnostic()?;

    let seed = args
        .seed
        .unwrap_or_else(|| u64::from(Utc::now().timestamp_subsec_nanos()));
    let mut rng = StdRng::seed_from_u64(seed);

    for station in &scenario.stations {
        let directory = args.output.join(station.id.to_string());
        fs::create_dir_all(&directory).into_diagnostic()?;
        fs::write(
            directory.join("acq.csv"),
            format!(
                "ID,conversion_factor,sample_interval\n{},{},{}\n",
                station.id, station.conversion_factor, scenario.sample_interval
            ),
        )
        .into_diagnostic()?;

        let samples = station.generate(&scenario, &mut rng).into_diagnostic()?;
        write_chunks(&scenario, station, &directory, &samples).into_diagnostic()?;
        info!(
            station = station.id,
            samples = samples.len(),
            "station tree written"
        );
    }
    Ok(())
}

/// Splits one station's samples into chunk files of `chunk_seconds` each,
/// named `<station>.<YYYYMMDD>.<HHMMSS>.dat`.
fn write_chunks(
    scenario: &Scenario,
    station: &StationScenario,
    directory: &std::path::Path,
    samples: &[f64],
) -> std::io::Result<()> {
    let samples_per_chunk =
        ((scenario.chunk_seconds as f64 / scenario.sample_interval).round() as usize).max(1);
    for (index, chunk) in samples.chunks(samples_per_chunk).enumerate() {
        let start: DateTime<Utc> = scenario.start
            + Duration::seconds((index * scenario.chunk_seconds as usize) as i64);
        let mut text = format!(
            "{},{}\n",
            start.format("%Y%m%d%H%M%S"),
            scenario.sample_interval
        );
        for sample in chunk {
            text.push_str(&format!("{sample}\n"));
        }
        let name = format!(
            "{}.{}.{}.dat",
            station.id,
            start.format("%Y%m%d"),
            start.format("%H%M%S")
        );
        fs::write(directory.join(name), text)?;
    }
    Ok(())
}
