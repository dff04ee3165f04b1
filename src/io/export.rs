//! Export fitted parameters to JSON.
//!
//! The parameter file is the portable record of a run: the filter selection, the
//! run timestamp, and for each fitted group its logistic parameters, inflection
//! point and fit quality. Curve grids are not included; they are reproducible
//! from the parameters and the data range.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Concentration, FilterParams, FitQuality, FitResult, SigmoidParams};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterFile {
    pub tool: String,
    pub generated: String,
    pub filters: FilterParams,
    pub fits: Vec<FitSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSummary {
    pub concentration: Concentration,
    pub params: SigmoidParams,
    pub inflection_x: f64,
    pub x_range: [f64; 2],
    pub files: usize,
    pub quality: FitQuality,
}

impl From<&FitResult> for FitSummary {
    fn from(fit: &FitResult) -> Self {
        let first = fit.curve_x.first().copied().unwrap_or(f64::NAN);
        let last = fit.curve_x.last().copied().unwrap_or(f64::NAN);
        Self {
            concentration: fit.concentration,
            params: fit.params,
            inflection_x: fit.inflection_x,
            x_range: [first, last],
            files: fit.files,
            quality: fit.quality.clone(),
        }
    }
}

/// Write the parameter JSON for a set of (already ordered) fits.
pub fn write_parameters_json(
    path: &Path,
    fits: &[FitResult],
    filters: &FilterParams,
    timestamp: &str,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create parameter JSON '{}': {e}", path.display())))?;

    let doc = ParameterFile {
        tool: "assay".to_string(),
        generated: timestamp.to_string(),
        filters: filters.clone(),
        fits: fits.iter().map(FitSummary::from).collect(),
    };

    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::config(format!("Failed to write parameter JSON: {e}")))?;
    Ok(())
}

/// Read a parameter JSON file back.
pub fn read_parameters_json(path: &Path) -> Result<ParameterFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open parameter JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::config(format!("Invalid parameter JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitOptions, fit};

    #[test]
    fn parameters_survive_a_write_and_read() {
        let x = [0.0, 100.0, 200.0, 300.0, 400.0, 500.0];
        let y = [1.0, 1.0, 5.0, 9.0, 10.0, 10.0];
        let result = fit(Concentration::new(5.0).unwrap(), &x, &y, &FitOptions::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        write_parameters_json(&path, &[result.clone()], &FilterParams::default(), "20260101-120000").unwrap();

        let doc = read_parameters_json(&path).unwrap();
        assert_eq!(doc.generated, "20260101-120000");
        assert_eq!(doc.fits.len(), 1);
        assert_eq!(doc.fits[0].concentration, result.concentration);
        assert_eq!(doc.fits[0].x_range, [0.0, 500.0]);
        assert_eq!(doc.fits[0].params, result.params);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"L\""));
    }
}
