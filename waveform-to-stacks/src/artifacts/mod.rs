//! The four cascading derived-artifact file types.
//!
//! Every artifact is a small write-once text file named
//! `<YYYYMMDDHHMM>-<station>.<extension>` under the output directory. Nothing
//! mutates an artifact after creation; each stage re-reads its predecessor's
//! file fresh, so the whole chain can be replayed from disk. CRT and VSB share
//! one physical layout (VSB is a CRT with the amplitude column replaced), and
//! the shared parsing/rendering lives here.
pub(crate) mod current_profile;
pub(crate) mod differential;
pub(crate) mod matched_voltage;
pub(crate) mod stacked;

use chrono::{DateTime, NaiveDateTime, Utc};
use em_survey_common::Real;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ArtifactError {
    #[error("cannot write artifact {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed artifact {} line {line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: &'static str,
    },
}

/// `<YYYYMMDDHHMM>-<station>.<extension>` under `output`.
///
/// `station` is a display label rather than a bare id so that receiver-side
/// artifacts can carry their `<tx>-<rx>` pair; the pair keeps names unique
/// when several transmitters share one receiver in the same minute.
pub(crate) fn artifact_path(
    output: &Path,
    timestamp: DateTime<Utc>,
    station: &str,
    extension: &str,
) -> PathBuf {
    output.join(format!(
        "{}-{}.{}",
        timestamp.format("%Y%m%d%H%M"),
        station,
        extension
    ))
}

/// Zero-byte placeholder, written wherever a terminal failure would otherwise
/// leave a hole in the output tree.
pub(crate) fn write_empty(path: &Path) -> Result<(), ArtifactError> {
    fs::write(path, "").map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_text(path: &Path, text: &str) -> Result<(), ArtifactError> {
    fs::write(path, text).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn read_text(path: &Path) -> Result<String, ArtifactError> {
    fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn malformed(path: &Path, line: usize, reason: &'static str) -> ArtifactError {
    ArtifactError::Malformed {
        path: path.to_path_buf(),
        line,
        reason,
    }
}

/// `+1.234` / `-1.234`, or the literal `NaN`.
pub(crate) fn format_signed(value: Real) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:+.3}")
    }
}

/// Inverse of [format_signed]; also accepts plain unsigned decimals.
pub(crate) fn parse_signed(
    path: &Path,
    line: usize,
    text: &str,
) -> Result<Real, ArtifactError> {
    text.trim()
        .parse()
        .map_err(|_| malformed(path, line, "unparseable value"))
}

/// The layout CRT and VSB share: a `YYYYMMDDHHMM,SS,<sample_interval>` header
/// followed by `start,end,value` rows.
pub(crate) fn render_profile(
    timestamp: DateTime<Utc>,
    sample_interval: Real,
    rows: impl Iterator<Item = (usize, usize, Real)>,
) -> String {
    let mut text = format!(
        "{},{},{}\n",
        timestamp.format("%Y%m%d%H%M"),
        timestamp.format("%S"),
        sample_interval
    );
    for (start, end, value) in rows {
        text.push_str(&format!("{start},{end},{value}\n"));
    }
    text
}

/// Parses the shared CRT/VSB layout. Row values come back exactly as written
/// (floats render in shortest round-trip form, and `NaN` is a legal value).
pub(crate) fn parse_profile(
    path: &Path,
    text: &str,
) -> Result<(DateTime<Utc>, Real, Vec<(usize, usize, Real)>), ArtifactError> {
    let mut lines = text.lines().enumerate();
    let (_, header) = lines
        .next()
        .ok_or_else(|| malformed(path, 1, "missing header"))?;

    let mut fields = header.split(',').map(str::trim);
    let header_fields = fields
        .next()
        .zip(fields.next())
        .zip(fields.next())
        .map(|((date, seconds), interval)| (date, seconds, interval));
    let Some((date, seconds, interval)) = header_fields else {
        return Err(malformed(path, 1, "expected `YYYYMMDDHHMM,SS,<interval>`"));
    };
    let timestamp = NaiveDateTime::parse_from_str(
        &format!("{date}{seconds}"),
        "%Y%m%d%H%M%S",
    )
    .map_err(|_| malformed(path, 1, "unparseable header timestamp"))?
    .and_utc();
    let sample_interval: Real = interval
        .parse()
        .map_err(|_| malformed(path, 1, "unparseable sample interval"))?;
    if sample_interval <= 0.0 {
        return Err(malformed(path, 1, "non-positive sample interval"));
    }

    let mut rows = Vec::new();
    for (index, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let row = fields
            .next()
            .and_then(|start| start.parse::<usize>().ok())
            .zip(fields.next().and_then(|end| end.parse::<usize>().ok()))
            .zip(fields.next().and_then(|value| value.parse::<Real>().ok()));
        let Some(((start, end), value)) = row else {
            return Err(malformed(path, index + 1, "expected `start,end,value`"));
        };
        rows.push((start, end, value));
    }
    Ok((timestamp, sample_interval, rows))
}
