//! Series extraction from a single assay log.
//!
//! A log is a CSV with (at least) an elapsed-time column and a baseline-corrected
//! signal column. We keep the rows whose time falls in the analysis window and
//! tag them with the source path.
//!
//! Extraction failures are per-file: `extract_or_empty` logs them and hands back
//! an empty batch, so one bad file never affects its siblings.

use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{LogSchema, SeriesBatch};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("'{path}' has no `{column}` column")]
    MissingColumn { path: PathBuf, column: String },
}

/// Anything that can turn a file reference into a windowed series.
pub trait SeriesSource: Sync {
    fn extract(&self, path: &Path) -> Result<SeriesBatch, ExtractError>;
}

/// Reads CSV logs according to a `LogSchema`.
#[derive(Debug, Clone, Default)]
pub struct CsvSeriesSource {
    pub schema: LogSchema,
}

impl CsvSeriesSource {
    pub fn new(schema: LogSchema) -> Self {
        Self { schema }
    }
}

impl SeriesSource for CsvSeriesSource {
    fn extract(&self, path: &Path) -> Result<SeriesBatch, ExtractError> {
        let file = File::open(path).map_err(|source| ExtractError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|source| ExtractError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .clone();
        let time_idx = find_column(&headers, &self.schema.time_column, path)?;
        let signal_idx = find_column(&headers, &self.schema.signal_column, path)?;

        let mut batch = SeriesBatch::new(path);
        let mut skipped = 0usize;
        for result in reader.records() {
            let record = result.map_err(|source| ExtractError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let time = record.get(time_idx).and_then(parse_finite);
            let signal = record.get(signal_idx).and_then(parse_finite);
            match (time, signal) {
                (Some(t), Some(s)) if self.schema.in_window(t) => batch.push(t, s),
                (Some(_), Some(_)) => {}
                _ => skipped += 1,
            }
        }

        debug!(
            file = %path.display(),
            rows = batch.len(),
            skipped,
            "extracted windowed series"
        );
        Ok(batch)
    }
}

/// Extract a series, turning any failure into a logged warning and an empty batch.
pub fn extract_or_empty(source: &dyn SeriesSource, path: &Path) -> SeriesBatch {
    match source.extract(path) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, "extraction failed; file skipped");
            SeriesBatch::new(path)
        }
    }
}

fn find_column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize, ExtractError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        .ok_or_else(|| ExtractError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })
}

fn parse_finite(raw: &str) -> Option<f64> {
    let v = raw.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}
