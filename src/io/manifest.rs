//! Manifest of which files contributed to each concentration group.
//!
//! The manifest is rectangular: one column per concentration (group order), one
//! row per file position. Shorter columns are padded with `None`, written as an
//! empty cell.

use std::path::Path;

use crate::domain::Concentration;
use crate::error::AppError;
use crate::fit::ConcentrationGroup;

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestColumn {
    pub concentration: Concentration,
    /// Basenames in discovery order, then `None` padding up to `Manifest::rows`.
    pub files: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub columns: Vec<ManifestColumn>,
    pub rows: usize,
}

impl Manifest {
    pub fn build(groups: &[ConcentrationGroup]) -> Self {
        let rows = groups.iter().map(|g| g.batches.len()).max().unwrap_or(0);
        let columns = groups
            .iter()
            .map(|g| {
                let mut files: Vec<Option<String>> = g.basenames().into_iter().map(Some).collect();
                files.resize(rows, None);
                ManifestColumn {
                    concentration: g.concentration,
                    files,
                }
            })
            .collect();
        Self { columns, rows }
    }

    /// Write as CSV: header = concentrations, absent cells empty.
    pub fn write_csv(&self, path: &Path) -> Result<(), AppError> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to create manifest '{}': {e}", path.display())))?;

        writer
            .write_record(self.columns.iter().map(|c| c.concentration.to_string()))
            .map_err(|e| AppError::config(format!("Failed to write manifest header: {e}")))?;

        for row in 0..self.rows {
            writer
                .write_record(self.columns.iter().map(|c| c.files[row].as_deref().unwrap_or("")))
                .map_err(|e| AppError::config(format!("Failed to write manifest row: {e}")))?;
        }

        writer
            .flush()
            .map_err(|e| AppError::config(format!("Failed to flush manifest '{}': {e}", path.display())))?;
        Ok(())
    }
}
