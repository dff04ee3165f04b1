//! Command-line parsing for the assay curve fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pipeline and math code. Conversion into a `RunConfig` lives in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::fit::FitOptions;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "assay", version, about = "Concentration-response curve fitting for assay logs")]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select logs from the testing database, fit every concentration group and
    /// write plots, the manifest and the parameter JSON.
    Run(RunArgs),
    /// Fit a single concentration from explicit log files and print the result.
    Fit(FitArgs),
    /// List the distinct values of each filter column in the testing database.
    Filters(FiltersArgs),
}

/// Testing database and search directory. Both fall back to the environment.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// CSV export of the testing database (env: ASSAY_SPREADSHEET).
    #[arg(long, value_name = "CSV")]
    pub spreadsheet: Option<PathBuf>,

    /// Directory searched recursively for logs (env: ASSAY_BASE_DIR).
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,
}

/// Log column names and analysis window.
#[derive(Debug, Args, Clone)]
pub struct SchemaArgs {
    /// Elapsed-time column in each log.
    #[arg(long, default_value = "Time from Start (sec)")]
    pub time_column: String,

    /// Signal column in each log.
    #[arg(long, default_value = "UWA_BaselineCorr_2")]
    pub signal_column: String,

    /// Start of the analysis window (seconds, inclusive).
    #[arg(long, default_value_t = 0.0)]
    pub window_start: f64,

    /// End of the analysis window (seconds, exclusive).
    #[arg(long, default_value_t = 600.0)]
    pub window_end: f64,

    /// Optimizer evaluation cap per group.
    #[arg(long, default_value_t = FitOptions::default().max_evaluations)]
    pub max_evaluations: usize,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Output root (default: <base-dir>/Visuals).
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Receptor (case-insensitive).
    #[arg(long, default_value = "succyl-betacylcodextrin")]
    pub receptor: String,

    /// Testing code.
    #[arg(long, default_value = "TC58")]
    pub testing_code: String,

    /// Coating code (integer or text).
    #[arg(long, default_value = "122")]
    pub coating_code: String,

    /// Target analyte.
    #[arg(long, default_value = "PFOA")]
    pub target_analyte: String,

    /// Accepted run result classification (repeatable). Rows with an empty
    /// classification are always accepted.
    #[arg(
        long = "classification",
        value_name = "NAME",
        default_values_t = ["Low Response".to_string(), "High Response".to_string(), "Good".to_string()]
    )]
    pub classifications: Vec<String>,

    /// JSON file with the full filter selection; replaces the filter flags above.
    #[arg(long, value_name = "JSON")]
    pub filters: Option<PathBuf>,

    /// Log file extension (without the dot).
    #[arg(long, default_value = "csv")]
    pub log_extension: String,

    /// Fit groups in parallel.
    #[arg(long)]
    pub parallel: bool,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Log files to pool into one group.
    #[arg(required = true, value_name = "LOG")]
    pub logs: Vec<PathBuf>,

    /// Concentration label for the group.
    #[arg(short, long, default_value_t = 0.0)]
    pub concentration: f64,

    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Also write the fitted parameters as JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Also render the group plot as PNG.
    #[arg(long, value_name = "PNG")]
    pub plot: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct FiltersArgs {
    /// CSV export of the testing database (env: ASSAY_SPREADSHEET).
    #[arg(long, value_name = "CSV")]
    pub spreadsheet: Option<PathBuf>,
}
