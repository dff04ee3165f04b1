//! The full run: metadata → files → series → groups → fits → artifacts.
//!
//! Both the `run` command and the worker thread go through `run_pipeline`; the
//! front-ends only differ in how they present progress and results.
//!
//! Failure policy:
//! - no matching rows, files or samples stop the run with a "no data" error
//! - a failed extraction or fit drops that file or group and is logged
//! - each artifact write is independent; failures are collected, not raised,
//!   and an output tree that cannot be created counts as one such failure

use std::fs;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::app::worker::{CancelToken, Progress};
use crate::domain::{Concentration, FitResult, RunConfig};
use crate::error::AppError;
use crate::fit::{ConcentrationGroup, FitError, FitOptions, SeriesAggregator, fit_group, order_by_concentration};
use crate::io::{FileIndex, Manifest, MetadataTable, SeriesSource, extract_or_empty, write_parameters_json};
use crate::plot::{render_combined_plot, render_group_plot};

/// Format of the per-run timestamp embedded in artifact names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// An artifact that could not be written.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub path: PathBuf,
    pub message: String,
}

/// A group whose fit was abandoned.
#[derive(Debug, Clone)]
pub struct FitFailure {
    pub concentration: Concentration,
    pub error: FitError,
}

/// Counts from the selection stage.
#[derive(Debug, Clone, Default)]
pub struct SelectionStats {
    pub rows_read: usize,
    pub records: usize,
    pub indexed_files: usize,
    pub matched_files: usize,
    pub extracted_files: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub timestamp: String,
    pub output_dir: PathBuf,
    pub stats: SelectionStats,
    /// Non-empty groups in first-reference order.
    pub groups: Vec<ConcentrationGroup>,
    /// Successful fits ordered by concentration.
    pub fits: Vec<FitResult>,
    pub fit_failures: Vec<FitFailure>,
    pub artifacts: Vec<PathBuf>,
    pub write_failures: Vec<WriteFailure>,
}

/// Directory tree for one filter selection.
///
/// ```text
/// <root>/
///   individual/<conc>/uwa_BaselineCorr_2_plot_<conc>_<ts>.png
///   overall/overall_visuals/grouped_uwa_BaselineCorr_2_plot_<ts>.png
///   overall/overall_org/filenames_by_concentration_<ts>.csv
///   overall/overall_org/fit_parameters_<ts>.json
/// ```
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub timestamp: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, timestamp: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn individual_dir(&self) -> PathBuf {
        self.root.join("individual")
    }

    pub fn visuals_dir(&self) -> PathBuf {
        self.root.join("overall").join("overall_visuals")
    }

    pub fn org_dir(&self) -> PathBuf {
        self.root.join("overall").join("overall_org")
    }

    pub fn group_dir(&self, concentration: Concentration) -> PathBuf {
        self.individual_dir().join(concentration.to_string())
    }

    pub fn group_plot(&self, concentration: Concentration) -> PathBuf {
        self.group_dir(concentration)
            .join(format!("uwa_BaselineCorr_2_plot_{concentration}_{}.png", self.timestamp))
    }

    pub fn combined_plot(&self) -> PathBuf {
        self.visuals_dir()
            .join(format!("grouped_uwa_BaselineCorr_2_plot_{}.png", self.timestamp))
    }

    pub fn manifest(&self) -> PathBuf {
        self.org_dir()
            .join(format!("filenames_by_concentration_{}.csv", self.timestamp))
    }

    pub fn parameters(&self) -> PathBuf {
        self.org_dir().join(format!("fit_parameters_{}.json", self.timestamp))
    }

    /// Create the shared directories. Per-group folders are created on demand.
    pub fn create(&self) -> Result<(), AppError> {
        for dir in [self.individual_dir(), self.visuals_dir(), self.org_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                AppError::config(format!("Failed to create output directory '{}': {e}", dir.display()))
            })?;
        }
        Ok(())
    }
}

pub fn run_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Execute a run.
///
/// `on_progress` is called after each matched file is processed.
pub fn run_pipeline(
    config: &RunConfig,
    source: &dyn SeriesSource,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<RunOutput, AppError> {
    if cancel.is_cancelled() {
        return Err(AppError::cancelled());
    }

    // 1) Metadata selection.
    let table = MetadataTable::load(&config.spreadsheet)?;
    let selection = table.select(&config.filters, &config.log_extension)?;
    let mut stats = SelectionStats {
        rows_read: selection.rows_read,
        records: selection.records.len(),
        ..SelectionStats::default()
    };
    if selection.records.is_empty() {
        return Err(AppError::no_data(format!(
            "No metadata rows match {} ({} rows read).",
            config.filters.dir_name(),
            selection.rows_read
        )));
    }

    // 2) Resolve log files.
    let index = FileIndex::build(&config.base_dir, &config.log_extension)?;
    stats.indexed_files = index.len();

    let mut aggregator = SeriesAggregator::new();
    let mut matched: Vec<(Concentration, PathBuf)> = Vec::new();
    for record in &selection.records {
        let hits = index.lookup(&record.cleaned_filename);
        if hits.is_empty() {
            debug!(line = record.line, file = %record.cleaned_filename, "log file not found");
            continue;
        }
        aggregator.register(record.concentration);
        matched.extend(hits.into_iter().map(|p| (record.concentration, p.to_path_buf())));
    }
    stats.matched_files = matched.len();
    if matched.is_empty() {
        return Err(AppError::no_data(format!(
            "None of the {} selected log files were found under '{}'.",
            selection.records.len(),
            config.base_dir.display()
        )));
    }
    info!(
        records = stats.records,
        files = stats.matched_files,
        "matched metadata to log files"
    );

    // 3) Extract.
    let total = matched.len();
    for (i, (concentration, path)) in matched.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(AppError::cancelled());
        }
        let batch = extract_or_empty(source, &path);
        if !batch.is_empty() {
            stats.extracted_files += 1;
        }
        aggregator.add(concentration, batch);
        on_progress(Progress {
            completed: i + 1,
            total,
        });
    }
    if aggregator.total_samples() == 0 {
        return Err(AppError::no_data(
            "No samples inside the analysis window in any matched file.",
        ));
    }

    // 4) Fit.
    let groups = aggregator.into_groups();
    let group_fits = fit_groups(&groups, config, cancel)?;

    let mut fit_failures = Vec::new();
    let mut successes = Vec::new();
    for (group, result) in groups.iter().zip(&group_fits) {
        match result {
            Ok(fit) => successes.push(fit.clone()),
            Err(error) => {
                warn!(concentration = %group.concentration, %error, "fit failed; group omitted");
                fit_failures.push(FitFailure {
                    concentration: group.concentration,
                    error: error.clone(),
                });
            }
        }
    }
    let fits = order_by_concentration(successes);
    info!(
        groups = groups.len(),
        fitted = fits.len(),
        failed = fit_failures.len(),
        "fitting finished"
    );

    // 5) Artifacts.
    let timestamp = run_timestamp();
    let layout = OutputLayout::new(config.filter_dir(), timestamp.clone());
    let writer = write_artifacts(&layout, &groups, &group_fits, &fits, config, cancel)?;

    info!(
        dir = %layout.root.display(),
        written = writer.written.len(),
        failed = writer.failures.len(),
        "artifacts written"
    );

    Ok(RunOutput {
        timestamp,
        output_dir: layout.root,
        stats,
        groups,
        fits,
        fit_failures,
        artifacts: writer.written,
        write_failures: writer.failures,
    })
}

/// Write every artifact under `layout`, recording failures instead of raising them.
///
/// Only cancellation aborts; it is checked before each group plot.
fn write_artifacts(
    layout: &OutputLayout,
    groups: &[ConcentrationGroup],
    group_fits: &[Result<FitResult, FitError>],
    fits: &[FitResult],
    config: &RunConfig,
    cancel: &CancelToken,
) -> Result<ArtifactWriter, AppError> {
    let mut writer = ArtifactWriter::default();
    if let Err(e) = layout.create() {
        writer.record(layout.root.clone(), Err(e.to_string()));
        return Ok(writer);
    }

    for (group, result) in groups.iter().zip(group_fits) {
        if cancel.is_cancelled() {
            return Err(AppError::cancelled());
        }
        let path = layout.group_plot(group.concentration);
        let outcome = fs::create_dir_all(layout.group_dir(group.concentration))
            .map_err(|e| e.to_string())
            .and_then(|()| render_group_plot(&path, group, result.as_ref().ok()).map_err(|e| e.to_string()));
        writer.record(path, outcome);
    }

    if fits.is_empty() {
        info!("no successful fits; combined plot skipped");
    } else {
        let path = layout.combined_plot();
        let outcome = render_combined_plot(&path, fits).map_err(|e| e.to_string());
        writer.record(path, outcome);
    }

    let path = layout.manifest();
    let outcome = Manifest::build(groups).write_csv(&path).map_err(|e| e.to_string());
    writer.record(path, outcome);

    let path = layout.parameters();
    let outcome =
        write_parameters_json(&path, fits, &config.filters, &layout.timestamp).map_err(|e| e.to_string());
    writer.record(path, outcome);

    Ok(writer)
}

fn fit_groups(
    groups: &[ConcentrationGroup],
    config: &RunConfig,
    cancel: &CancelToken,
) -> Result<Vec<Result<FitResult, FitError>>, AppError> {
    let opts = FitOptions {
        max_evaluations: config.max_evaluations,
    };

    if config.parallel {
        if cancel.is_cancelled() {
            return Err(AppError::cancelled());
        }
        // `collect` on an indexed parallel iterator keeps group order.
        let results = groups.par_iter().map(|g| fit_group(g, &opts)).collect();
        if cancel.is_cancelled() {
            return Err(AppError::cancelled());
        }
        return Ok(results);
    }

    let mut results = Vec::with_capacity(groups.len());
    for group in groups {
        if cancel.is_cancelled() {
            return Err(AppError::cancelled());
        }
        debug!(concentration = %group.concentration, samples = group.sample_count(), "fitting group");
        results.push(fit_group(group, &opts));
    }
    Ok(results)
}

#[derive(Default)]
struct ArtifactWriter {
    written: Vec<PathBuf>,
    failures: Vec<WriteFailure>,
}

impl ArtifactWriter {
    fn record(&mut self, path: PathBuf, outcome: Result<(), String>) {
        match outcome {
            Ok(()) => {
                debug!(path = %path.display(), "wrote artifact");
                self.written.push(path);
            }
            Err(message) => {
                warn!(path = %path.display(), error = %message, "artifact write failed");
                self.failures.push(WriteFailure { path, message });
            }
        }
    }
}
