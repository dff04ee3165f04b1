//! Resolution of the two input locations a run needs.
//!
//! The pipeline never searches the machine for well-known folders; it asks a
//! `PathResolver` instead. The default resolver reads explicit CLI values first,
//! then `ASSAY_SPREADSHEET` / `ASSAY_BASE_DIR` from the environment (a `.env` file
//! is loaded if present).

use std::path::PathBuf;

use tracing::info;

use crate::error::AppError;

pub const ENV_SPREADSHEET: &str = "ASSAY_SPREADSHEET";
pub const ENV_BASE_DIR: &str = "ASSAY_BASE_DIR";

/// Inputs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// CSV export of the testing database.
    pub spreadsheet: PathBuf,
    /// Directory searched for assay logs.
    pub base_dir: PathBuf,
}

pub trait PathResolver {
    fn resolve(&self) -> Result<ResolvedPaths, AppError>;
}

/// Already-known paths (tests, embedding).
impl PathResolver for ResolvedPaths {
    fn resolve(&self) -> Result<ResolvedPaths, AppError> {
        Ok(self.clone())
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// CLI overrides, then environment.
pub struct EnvPathResolver {
    spreadsheet: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    lookup: Lookup,
}

impl EnvPathResolver {
    pub fn new(spreadsheet: Option<PathBuf>, base_dir: Option<PathBuf>) -> Self {
        Self::with_lookup(spreadsheet, base_dir, |key| {
            dotenvy::dotenv().ok();
            std::env::var(key).ok()
        })
    }

    /// Same resolver with a custom variable lookup.
    pub fn with_lookup<F>(spreadsheet: Option<PathBuf>, base_dir: Option<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            spreadsheet,
            base_dir,
            lookup: Box::new(lookup),
        }
    }

    fn pick(&self, explicit: &Option<PathBuf>, key: &str, what: &str) -> Result<PathBuf, AppError> {
        explicit
            .clone()
            .or_else(|| (self.lookup)(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from))
            .ok_or_else(|| AppError::config(format!("Could not resolve {what}: pass it explicitly or set {key}.")))
    }
}

impl PathResolver for EnvPathResolver {
    fn resolve(&self) -> Result<ResolvedPaths, AppError> {
        let spreadsheet = self.pick(&self.spreadsheet, ENV_SPREADSHEET, "the testing database path")?;
        let base_dir = self.pick(&self.base_dir, ENV_BASE_DIR, "the base search directory")?;

        if !spreadsheet.is_file() {
            return Err(AppError::config(format!(
                "Testing database '{}' does not exist.",
                spreadsheet.display()
            )));
        }
        if !base_dir.is_dir() {
            return Err(AppError::config(format!(
                "Base directory '{}' does not exist.",
                base_dir.display()
            )));
        }

        info!(spreadsheet = %spreadsheet.display(), base_dir = %base_dir.display(), "resolved input paths");
        Ok(ResolvedPaths { spreadsheet, base_dir })
    }
}
