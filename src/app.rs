//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - initialises logging
//! - resolves input paths and builds the run configuration
//! - runs the pipeline on the worker thread and prints the summary

use std::io::Write;
use std::path::Path;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, FitArgs, FiltersArgs, RunArgs, SchemaArgs};
use crate::domain::{CoatingCode, Concentration, FilterParams, LogSchema, RunConfig};
use crate::error::AppError;
use crate::fit::{ConcentrationGroup, FitOptions};
use crate::io::{CsvSeriesSource, EnvPathResolver, FILTER_COLUMNS, MetadataTable, PathResolver, SeriesSource};

pub mod pipeline;
pub mod worker;

/// Entry point for the `assay` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Fit(args) => handle_fit(args),
        Command::Filters(args) => handle_filters(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (e.g. in tests) is harmless.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let resolver = EnvPathResolver::new(args.input.spreadsheet.clone(), args.input.base_dir.clone());
    let config = run_config_from_args(&args, &resolver)?;
    info!(
        spreadsheet = %config.spreadsheet.display(),
        base_dir = %config.base_dir.display(),
        output = %config.filter_dir().display(),
        "starting run"
    );

    let source = CsvSeriesSource::new(config.schema.clone());
    let handle = worker::spawn(config.clone(), source)?;

    let mut stderr = std::io::stderr();
    for p in handle.progress.iter() {
        write!(stderr, "\rProcessing files: {}/{} ({:.0}%)", p.completed, p.total, p.fraction() * 100.0).ok();
        stderr.flush().ok();
    }
    writeln!(stderr).ok();

    let output = handle.join()?;
    println!("{}", crate::report::format_run_summary(&output, &config));
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let concentration = Concentration::new(args.concentration)
        .ok_or_else(|| AppError::config("Concentration must be a finite number."))?;
    let schema = schema_from_args(&args.schema)?;
    let source = CsvSeriesSource::new(schema);

    let mut group = ConcentrationGroup::new(concentration);
    for path in &args.logs {
        let batch = source
            .extract(path)
            .map_err(|e| AppError::config(format!("Failed to read log: {e}")))?;
        debug!(file = %path.display(), samples = batch.len(), "loaded log");
        if !batch.is_empty() {
            group.batches.push(batch);
        }
    }
    if group.is_empty() {
        return Err(AppError::no_data("No samples inside the analysis window."));
    }

    let opts = FitOptions {
        max_evaluations: args.schema.max_evaluations,
    };
    let fit = crate::fit::fit_group(&group, &opts)
        .map_err(|e| AppError::no_data(format!("Fit failed for concentration {concentration}: {e}")))?;
    println!("{}", crate::report::format_fit_detail(&fit));

    if let Some(path) = &args.export {
        let timestamp = pipeline::run_timestamp();
        crate::io::write_parameters_json(path, std::slice::from_ref(&fit), &FilterParams::default(), &timestamp)?;
    }
    if let Some(path) = &args.plot {
        crate::plot::render_group_plot(path, &group, Some(&fit))
            .map_err(|e| AppError::config(e.to_string()))?;
    }
    Ok(())
}

fn handle_filters(args: FiltersArgs) -> Result<(), AppError> {
    let spreadsheet = match args.spreadsheet {
        Some(path) => path,
        None => EnvPathResolver::new(None, None).resolve()?.spreadsheet,
    };
    let table = MetadataTable::load(&spreadsheet)?;
    for column in FILTER_COLUMNS {
        let values = table.distinct_values(column)?;
        println!("{}", crate::report::format_distinct_values(column, &values));
    }
    Ok(())
}

/// Build a `RunConfig` from CLI args, resolving paths through `resolver`.
pub fn run_config_from_args(args: &RunArgs, resolver: &dyn PathResolver) -> Result<RunConfig, AppError> {
    let paths = resolver.resolve()?;
    let filters = match &args.filters {
        Some(path) => load_filter_file(path)?,
        None => FilterParams {
            receptor: args.receptor.clone(),
            testing_code: args.testing_code.clone(),
            coating_code: CoatingCode::parse(&args.coating_code),
            target_analyte: args.target_analyte.clone(),
            run_result_classification: args.classifications.iter().cloned().collect(),
        },
    };
    let output_root = args
        .output
        .clone()
        .unwrap_or_else(|| paths.base_dir.join("Visuals"));

    Ok(RunConfig {
        spreadsheet: paths.spreadsheet,
        base_dir: paths.base_dir,
        output_root,
        filters,
        schema: schema_from_args(&args.schema)?,
        log_extension: args.log_extension.trim_start_matches('.').to_string(),
        max_evaluations: args.schema.max_evaluations,
        parallel: args.parallel,
    })
}

fn schema_from_args(args: &SchemaArgs) -> Result<LogSchema, AppError> {
    if !(args.window_start.is_finite() && args.window_end.is_finite() && args.window_start < args.window_end) {
        return Err(AppError::config(format!(
            "Invalid analysis window [{}, {}).",
            args.window_start, args.window_end
        )));
    }
    Ok(LogSchema {
        time_column: args.time_column.clone(),
        signal_column: args.signal_column.clone(),
        window: (args.window_start, args.window_end),
    })
}

fn load_filter_file(path: &Path) -> Result<FilterParams, AppError> {
    let file = std::fs::File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open filter file '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::config(format!("Invalid filter file '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::io::ResolvedPaths;
    use std::path::PathBuf;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["assay", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    fn paths() -> ResolvedPaths {
        ResolvedPaths {
            spreadsheet: PathBuf::from("/data/db.csv"),
            base_dir: PathBuf::from("/data/logs"),
        }
    }

    #[test]
    fn defaults_produce_standard_config() {
        let config = run_config_from_args(&run_args(&[]), &paths()).unwrap();
        assert_eq!(config.filters, FilterParams::default());
        assert_eq!(config.output_root, PathBuf::from("/data/logs/Visuals"));
        assert_eq!(
            config.filter_dir(),
            PathBuf::from("/data/logs/Visuals/succyl-betacylcodextrin_TC58_122_PFOA")
        );
        assert_eq!(config.schema.window, (0.0, 600.0));
        assert_eq!(config.max_evaluations, 10_000);
    }

    #[test]
    fn flags_override_filters_and_output() {
        let args = run_args(&[
            "--receptor",
            "beta cd",
            "--coating-code",
            "C-9",
            "-o",
            "/tmp/out",
            "--log-extension",
            ".txt",
        ]);
        let config = run_config_from_args(&args, &paths()).unwrap();
        assert_eq!(config.filters.coating_code, CoatingCode::Text("C-9".to_string()));
        assert_eq!(config.filters.dir_name(), "beta_cd_TC58_C-9_PFOA");
        assert_eq!(config.output_root, PathBuf::from("/tmp/out"));
        assert_eq!(config.log_extension, "txt");
    }

    #[test]
    fn filter_file_replaces_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(
            &path,
            r#"{"receptor":"r","testing_code":"TC1","coating_code":7,"target_analyte":"PFOS","run_result_classification":["Good"]}"#,
        )
        .unwrap();

        let args = run_args(&["--filters", path.to_str().unwrap()]);
        let config = run_config_from_args(&args, &paths()).unwrap();
        assert_eq!(config.filters.coating_code, CoatingCode::Int(7));
        assert_eq!(config.filters.run_result_classification.len(), 1);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let args = run_args(&["--window-start", "600", "--window-end", "0"]);
        let err = run_config_from_args(&args, &paths()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}
