//! Directory-backed waveform store.
//!
//! Layout: one subdirectory per station under the input root, one `.dat`
//! chunk file per short recording interval, named
//! `<station>.<YYYYMMDD>.<HHMMSS>.dat`. A chunk starts with a header line
//! `YYYYMMDDHHMMSS,<sample_interval>` followed by one sample per line. The
//! field recorders' own download agent maintains this tree; the pipeline only
//! ever reads it.
use super::{StoreError, Waveform, WaveformStore};
use chrono::{DateTime, NaiveDateTime, Utc};
use em_survey_common::{Real, StationId};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub(crate) struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

struct Chunk {
    start: DateTime<Utc>,
    sample_interval: Real,
    samples: Vec<Real>,
}

impl Chunk {
    fn end(&self) -> DateTime<Utc> {
        self.start
            + chrono::Duration::microseconds(
                (self.samples.len() as Real * self.sample_interval * 1e6).round() as i64,
            )
    }
}

fn malformed(path: &Path, line: usize, reason: &'static str) -> StoreError {
    StoreError::MalformedChunk {
        path: path.to_path_buf(),
        line,
        reason,
    }
}

fn read_chunk(path: &Path) -> Result<Chunk, StoreError> {
    let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = text.lines();
    let header = lines.next().ok_or_else(|| malformed(path, 1, "empty file"))?;

    let (timestamp, interval) = header
        .split_once(',')
        .ok_or_else(|| malformed(path, 1, "expected `YYYYMMDDHHMMSS,<interval>`"))?;
    let start = NaiveDateTime::parse_from_str(timestamp.trim(), "%Y%m%d%H%M%S")
        .map_err(|_| malformed(path, 1, "unparseable start timestamp"))?
        .and_utc();
    let sample_interval: Real = interval
        .trim()
        .parse()
        .map_err(|_| malformed(path, 1, "unparseable sample interval"))?;
    if sample_interval <= 0.0 {
        return Err(malformed(path, 1, "non-positive sample interval"));
    }

    let mut samples = Vec::new();
    for (index, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: Real = line
            .parse()
            .map_err(|_| malformed(path, index + 2, "unparseable sample"))?;
        samples.push(sample);
    }
    Ok(Chunk {
        start,
        sample_interval,
        samples,
    })
}

impl WaveformStore for DirectoryStore {
    fn fetch(
        &self,
        station: StationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Waveform>, StoreError> {
        let pattern = self
            .root
            .join(station.to_string())
            .join("*.dat")
            .to_string_lossy()
            .into_owned();
        let Ok(paths) = glob::glob(&pattern) else {
            // A station id cannot produce an invalid pattern.
            return Ok(None);
        };

        let mut chunks = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(error) => {
                    warn!("skipping unreadable directory entry: {error}");
                    continue;
                }
            };
            let chunk = read_chunk(&path)?;
            if chunk.start <= end && chunk.end() >= start && !chunk.samples.is_empty() {
                chunks.push(chunk);
            }
        }
        if chunks.is_empty() {
            debug!(station, "no coverage for interval");
            return Ok(None);
        }
        chunks.sort_by_key(|chunk| chunk.start);

        // Clip each chunk to the closed interval and lay the survivors end to
        // end. The concatenation's start is the earliest sample actually
        // included.
        let sample_interval = chunks
            .first()
            .map(|chunk| chunk.sample_interval)
            .unwrap_or_default();
        if chunks
            .iter()
            .any(|chunk| chunk.sample_interval != sample_interval)
        {
            warn!(station, "chunks disagree on sample interval; using the earliest");
        }
        let mut samples = Vec::new();
        let mut concatenation_start = None;
        for chunk in &chunks {
            let interval_us = (chunk.sample_interval * 1e6).round() as i64;
            let offset_start = (start - chunk.start).num_microseconds().unwrap_or(i64::MAX);
            let offset_end = (end - chunk.start).num_microseconds().unwrap_or(i64::MIN);
            let first = if offset_start <= 0 {
                0
            } else {
                (offset_start + interval_us - 1) / interval_us
            };
            if offset_end < 0 {
                continue;
            }
            let last = (offset_end / interval_us).min(chunk.samples.len() as i64 - 1);
            if first > last {
                continue;
            }
            if concatenation_start.is_none() {
                concatenation_start = Some(
                    chunk.start
                        + chrono::Duration::microseconds(first * interval_us),
                );
            }
            samples.extend_from_slice(&chunk.samples[first as usize..=last as usize]);
        }

        match concatenation_start {
            Some(start) if !samples.is_empty() => Ok(Some(Waveform {
                samples,
                start,
                sample_interval,
            })),
            _ => Ok(None),
        }
    }
}
