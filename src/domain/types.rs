//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during aggregation and fitting
//! - exported to JSON/CSV
//! - loaded from filter files

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Analyte concentration used as the grouping key.
///
/// Spreadsheet cells can hold `-0.0` or `0.0` for the same physical value, so the
/// constructor normalizes the sign of zero. Equality is bitwise on the normalized
/// value; ordering uses `f64::total_cmp` so sorting never needs a fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Concentration(f64);

impl Concentration {
    /// Build a key from a finite value. Returns `None` for NaN/infinite input.
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(Self(if value == 0.0 { 0.0 } else { value }))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Concentration {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Concentration {}

impl std::hash::Hash for Concentration {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Concentration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Concentration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Concentration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Samples extracted from one source log, already restricted to the analysis window.
///
/// `x` is elapsed time (seconds), `y` the baseline-corrected signal. Both columns
/// always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBatch {
    pub source: PathBuf,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl SeriesBatch {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            x: Vec::new(),
            y: Vec::new(),
        }
    }

    pub fn push(&mut self, time: f64, signal: f64) {
        self.x.push(time);
        self.y.push(signal);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// File name without directories, as written to the manifest.
    pub fn basename(&self) -> String {
        basename(&self.source)
    }

    /// Iterate `(time, signal)` pairs in file order.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Four-parameter logistic parameters.
///
/// `L` = amplitude, `x0` = midpoint, `k` = steepness, `b` = baseline offset.
/// No sign or ordering constraints are imposed; a negative `k` is a falling curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigmoidParams {
    #[serde(rename = "L")]
    pub l: f64,
    pub x0: f64,
    pub k: f64,
    pub b: f64,
}

impl SigmoidParams {
    pub fn to_array(self) -> [f64; 4] {
        [self.l, self.x0, self.k, self.b]
    }

    pub fn from_slice(p: &[f64]) -> Self {
        Self {
            l: p[0],
            x0: p[1],
            k: p[2],
            b: p[3],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub rmse: f64,
    pub n: usize,
    /// Objective evaluations spent by the optimizer.
    pub evaluations: usize,
}

/// Fitted curve for one concentration group.
///
/// `curve_x` is a uniform, strictly increasing grid over `[min x, max x]` of the
/// group's data; `curve_y` is the fitted sigmoid on that grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub concentration: Concentration,
    pub params: SigmoidParams,
    pub curve_x: Vec<f64>,
    pub curve_y: Vec<f64>,
    pub inflection_x: f64,
    pub quality: FitQuality,
    /// Number of source files that contributed samples.
    pub files: usize,
}

impl FitResult {
    pub fn curve_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.curve_x.iter().copied().zip(self.curve_y.iter().copied())
    }
}

/// Coating codes are numeric in most rows but free text in a few.
///
/// Integers compare numerically so `122` and `122.0` match; anything else compares
/// as trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoatingCode {
    Int(i64),
    Text(String),
}

impl CoatingCode {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if let Ok(v) = s.parse::<i64>() {
            return CoatingCode::Int(v);
        }
        if let Ok(v) = s.parse::<f64>() {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                return CoatingCode::Int(v as i64);
            }
        }
        CoatingCode::Text(s.to_string())
    }

    pub fn matches(&self, cell: &str) -> bool {
        *self == CoatingCode::parse(cell)
    }
}

impl fmt::Display for CoatingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoatingCode::Int(v) => write!(f, "{v}"),
            CoatingCode::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Metadata filter selection.
///
/// Rows with an empty run-result classification always pass the classification
/// filter, regardless of the selected set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub receptor: String,
    pub testing_code: String,
    pub coating_code: CoatingCode,
    pub target_analyte: String,
    #[serde(default)]
    pub run_result_classification: BTreeSet<String>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            receptor: "succyl-betacylcodextrin".to_string(),
            testing_code: "TC58".to_string(),
            coating_code: CoatingCode::Int(122),
            target_analyte: "PFOA".to_string(),
            run_result_classification: ["Low Response", "High Response", "Good"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl FilterParams {
    /// Directory name for this filter selection: `receptor_testing_coating_analyte`
    /// with spaces replaced by underscores.
    pub fn dir_name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.receptor, self.testing_code, self.coating_code, self.target_analyte
        )
        .replace(' ', "_")
    }
}

/// Column names and window used when reading an assay log.
#[derive(Debug, Clone)]
pub struct LogSchema {
    pub time_column: String,
    pub signal_column: String,
    /// Half-open analysis window `[start, end)` in seconds.
    pub window: (f64, f64),
}

impl Default for LogSchema {
    fn default() -> Self {
        Self {
            time_column: "Time from Start (sec)".to_string(),
            signal_column: "UWA_BaselineCorr_2".to_string(),
            window: (0.0, 600.0),
        }
    }
}

impl LogSchema {
    pub fn in_window(&self, t: f64) -> bool {
        t >= self.window.0 && t < self.window.1
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags, the environment, and defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// CSV export of the testing database sheet.
    pub spreadsheet: PathBuf,
    /// Directory searched recursively for assay logs.
    pub base_dir: PathBuf,
    /// Root under which the per-filter output tree is created.
    pub output_root: PathBuf,
    pub filters: FilterParams,
    pub schema: LogSchema,
    /// Extension of assay log files (without the dot).
    pub log_extension: String,
    /// Optimizer evaluation cap per group.
    pub max_evaluations: usize,
    /// Fit groups on the rayon pool instead of one after another.
    pub parallel: bool,
}

impl RunConfig {
    /// Per-filter output directory.
    pub fn filter_dir(&self) -> PathBuf {
        self.output_root.join(self.filters.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concentration_normalizes_negative_zero() {
        let a = Concentration::new(0.0).unwrap();
        let b = Concentration::new(-0.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0");
        assert!(Concentration::new(f64::NAN).is_none());
    }

    #[test]
    fn concentration_orders_numerically() {
        let mut v: Vec<Concentration> = [8.0, 2.0, 2.5, 0.1]
            .into_iter()
            .filter_map(Concentration::new)
            .collect();
        v.sort();
        let vals: Vec<f64> = v.iter().map(|c| c.value()).collect();
        assert_eq!(vals, vec![0.1, 2.0, 2.5, 8.0]);
    }

    #[test]
    fn coating_code_matches_integer_and_float_cells() {
        let code = CoatingCode::Int(122);
        assert!(code.matches("122"));
        assert!(code.matches(" 122.0 "));
        assert!(!code.matches("123"));

        let text = CoatingCode::parse("C-7");
        assert_eq!(text, CoatingCode::Text("C-7".to_string()));
        assert!(text.matches("C-7"));
    }

    #[test]
    fn filter_dir_name_replaces_spaces() {
        let mut f = FilterParams::default();
        f.receptor = "beta cd".to_string();
        assert_eq!(f.dir_name(), "beta_cd_TC58_122_PFOA");
    }

    #[test]
    fn filter_params_deserialize_with_numeric_or_text_coating() {
        let json = r#"{
            "receptor": "r",
            "testing_code": "TC1",
            "coating_code": 7,
            "target_analyte": "PFOS",
            "run_result_classification": ["Good"]
        }"#;
        let f: FilterParams = serde_json::from_str(json).unwrap();
        assert_eq!(f.coating_code, CoatingCode::Int(7));

        let json = r#"{"receptor":"r","testing_code":"TC1","coating_code":"X2","target_analyte":"PFOS"}"#;
        let f: FilterParams = serde_json::from_str(json).unwrap();
        assert_eq!(f.coating_code, CoatingCode::Text("X2".to_string()));
        assert!(f.run_result_classification.is_empty());
    }
}
