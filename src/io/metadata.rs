//! Testing-database ingest and filtering.
//!
//! The testing database is a spreadsheet with one row per assay run. We read its
//! CSV export and turn it into `(concentration, log filename)` records for the
//! runs that match a `FilterParams` selection.
//!
//! Design goals:
//! - **Strict schema** for the columns we filter on (clear errors + exit code 2)
//! - **Row-level leniency** for the values we extract (skip bad rows, report them)
//! - **Observable filtering**: the surviving row count is logged after each stage

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::domain::{Concentration, FilterParams};
use crate::error::AppError;

pub const COL_RECEPTOR: &str = "Receptor";
pub const COL_TESTING_CODE: &str = "Testing Code";
pub const COL_COATING_CODE: &str = "Coating Code";
pub const COL_TARGET_ANALYTE: &str = "Target Analyte";
pub const COL_RUN_RESULT: &str = "Run Result Classification";
pub const COL_LOG_FILENAME: &str = "Log Filename";
pub const COL_CONCENTRATION: &str = "Analyte Concentration";

/// Columns offered as filter choices, in the order they are applied.
pub const FILTER_COLUMNS: [&str; 5] = [
    COL_RECEPTOR,
    COL_TESTING_CODE,
    COL_COATING_CODE,
    COL_TARGET_ANALYTE,
    COL_RUN_RESULT,
];

/// One selected run: where its log should be and which group it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    /// 1-based line in the CSV export (header is line 1).
    pub line: usize,
    pub concentration: Concentration,
    pub log_filename: String,
    /// Basename to look up in the file index.
    pub cleaned_filename: String,
}

/// Row count after one filter stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStage {
    pub column: &'static str,
    pub rows: usize,
}

/// A row that matched every filter but could not be used.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Output of `MetadataTable::select`.
#[derive(Debug, Clone)]
pub struct MetadataSelection {
    pub records: Vec<MetadataRecord>,
    pub rows_read: usize,
    pub stages: Vec<FilterStage>,
    pub row_errors: Vec<RowError>,
}

/// The testing database held in memory.
#[derive(Debug, Clone)]
pub struct MetadataTable {
    header_map: HashMap<String, usize>,
    rows: Vec<(usize, StringRecord)>,
}

impl MetadataTable {
    /// Load the CSV export from disk.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::config(format!("Failed to open testing database '{}': {e}", path.display()))
        })?;
        let table = Self::from_reader(file)?;
        info!(path = %path.display(), rows = table.len(), "loaded testing database");
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| AppError::config(format!("Failed to read testing database headers: {e}")))?
            .clone();
        let header_map = build_header_map(&headers);

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            // records() starts after the header, and CSV lines are 1-based.
            let line = idx + 2;
            match result {
                Ok(record) => rows.push((line, record)),
                Err(e) => warn!(line, error = %e, "skipping unparseable testing database row"),
            }
        }

        Ok(Self { header_map, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted distinct non-empty values of a column (the choices a user can filter on).
    pub fn distinct_values(&self, column: &str) -> Result<Vec<String>, AppError> {
        let idx = self.column_index(column)?;
        let values: BTreeSet<String> = self
            .rows
            .iter()
            .filter_map(|(_, r)| cell(r, idx))
            .map(str::to_string)
            .collect();
        Ok(values.into_iter().collect())
    }

    /// Apply the filters in order and extract usable records.
    ///
    /// - receptor: case-insensitive, cell trimmed
    /// - testing code, target analyte: exact
    /// - coating code: numeric when both sides are integers, text otherwise
    /// - run result classification: in the selected set, or empty
    ///
    /// Rows without a log filename or a numeric concentration are dropped.
    pub fn select(&self, filters: &FilterParams, log_extension: &str) -> Result<MetadataSelection, AppError> {
        let receptor = self.column_index(COL_RECEPTOR)?;
        let testing = self.column_index(COL_TESTING_CODE)?;
        let coating = self.column_index(COL_COATING_CODE)?;
        let analyte = self.column_index(COL_TARGET_ANALYTE)?;
        let run_result = self.column_index(COL_RUN_RESULT)?;
        let log_name = self.column_index(COL_LOG_FILENAME)?;
        let concentration = self.column_index(COL_CONCENTRATION)?;

        let wanted_receptor = filters.receptor.trim().to_lowercase();

        let mut stages = Vec::with_capacity(FILTER_COLUMNS.len());
        let mut rows: Vec<&(usize, StringRecord)> = self.rows.iter().collect();

        rows.retain(|(_, r)| cell(r, receptor).is_some_and(|v| v.to_lowercase() == wanted_receptor));
        push_stage(&mut stages, COL_RECEPTOR, rows.len());

        rows.retain(|(_, r)| cell(r, testing) == Some(filters.testing_code.as_str()));
        push_stage(&mut stages, COL_TESTING_CODE, rows.len());

        rows.retain(|(_, r)| cell(r, coating).is_some_and(|v| filters.coating_code.matches(v)));
        push_stage(&mut stages, COL_COATING_CODE, rows.len());

        rows.retain(|(_, r)| cell(r, analyte) == Some(filters.target_analyte.as_str()));
        push_stage(&mut stages, COL_TARGET_ANALYTE, rows.len());

        rows.retain(|(_, r)| match cell(r, run_result) {
            None => true,
            Some(v) => filters.run_result_classification.contains(v),
        });
        push_stage(&mut stages, COL_RUN_RESULT, rows.len());

        let mut records = Vec::with_capacity(rows.len());
        let mut row_errors = Vec::new();
        for (line, r) in rows {
            let (Some(name), Some(raw_conc)) = (cell(r, log_name), cell(r, concentration)) else {
                continue;
            };
            let Some(conc) = raw_conc.parse::<f64>().ok().and_then(Concentration::new) else {
                warn!(line, value = raw_conc, "non-numeric analyte concentration; row skipped");
                row_errors.push(RowError {
                    line: *line,
                    message: format!("Invalid analyte concentration '{raw_conc}'"),
                });
                continue;
            };
            records.push(MetadataRecord {
                line: *line,
                concentration: conc,
                log_filename: name.to_string(),
                cleaned_filename: clean_log_filename(name, log_extension),
            });
        }
        info!(records = records.len(), "metadata rows selected");

        Ok(MetadataSelection {
            records,
            rows_read: self.rows.len(),
            stages,
            row_errors,
        })
    }

    fn column_index(&self, column: &str) -> Result<usize, AppError> {
        self.header_map
            .get(&normalize_header_name(column))
            .copied()
            .ok_or_else(|| AppError::config(format!("Testing database is missing required column `{column}`.")))
    }
}

/// Map a `Log Filename` cell to the basename of its recalculated log.
///
/// Every `_dlog` is removed, then `_dlog_recalc.<ext>` is appended:
/// `Run12_dlog` → `Run12_dlog_recalc.csv`.
pub fn clean_log_filename(name: &str, extension: &str) -> String {
    let stem = name.replace("_dlog", "");
    format!("{stem}_dlog_recalc.{}", extension.trim_start_matches('.'))
}

fn push_stage(stages: &mut Vec<FilterStage>, column: &'static str, rows: usize) {
    debug!(filter = column, rows, "after filter");
    stages.push(FilterStage { column, rows });
}

fn cell(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often carry a UTF-8 BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}
