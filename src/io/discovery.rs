//! One-shot index of assay log files under a base directory.
//!
//! The base directory is walked once per run; afterwards every metadata record is
//! resolved by exact basename against the in-memory index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::domain::basename;
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: Vec<PathBuf>,
    by_name: HashMap<String, Vec<usize>>,
}

impl FileIndex {
    /// Recursively collect files with `extension` (case-insensitive, no dot).
    ///
    /// Entries are visited in file-name order so lookups are deterministic across
    /// platforms. Unreadable entries are skipped.
    pub fn build(root: &Path, extension: &str) -> Result<Self, AppError> {
        if !root.is_dir() {
            return Err(AppError::config(format!(
                "Base directory '{}' does not exist or is not a directory.",
                root.display()
            )));
        }
        let extension = extension.trim_start_matches('.');

        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let matches_ext = entry
                .path()
                .extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
            if matches_ext {
                files.push(entry.into_path());
            }
        }

        if files.is_empty() {
            info!(root = %root.display(), extension, "no log files found");
        } else {
            info!(root = %root.display(), files = files.len(), "indexed log files");
        }
        Ok(Self::from_paths(files))
    }

    /// Index an explicit list of paths (in the given order).
    pub fn from_paths(files: Vec<PathBuf>) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, path) in files.iter().enumerate() {
            by_name.entry(basename(path)).or_default().push(idx);
        }
        Self { files, by_name }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// All indexed files whose basename equals `name`, in index order.
    pub fn lookup(&self, name: &str) -> Vec<&Path> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().map(|&i| self.files[i].as_path()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn build_indexes_nested_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        fs::write(root.join("a/b/Run1_dlog_recalc.csv"), "x").unwrap();
        fs::write(root.join("c/Run1_dlog_recalc.csv"), "x").unwrap();
        fs::write(root.join("c/Run2_dlog_recalc.CSV"), "x").unwrap();
        fs::write(root.join("c/notes.txt"), "x").unwrap();

        let index = FileIndex::build(root, "csv").unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.lookup("Run1_dlog_recalc.csv");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].ends_with("a/b/Run1_dlog_recalc.csv"));
        assert!(hits[1].ends_with("c/Run1_dlog_recalc.csv"));

        assert_eq!(index.lookup("Run2_dlog_recalc.CSV").len(), 1);
        assert!(index.lookup("notes.txt").is_empty());
    }

    #[test]
    fn lookup_is_exact() {
        let index = FileIndex::from_paths(vec![PathBuf::from("/x/Run10_dlog_recalc.csv")]);
        assert!(index.lookup("Run1_dlog_recalc.csv").is_empty());
        assert_eq!(index.lookup("Run10_dlog_recalc.csv").len(), 1);
    }

    #[test]
    fn missing_root_is_a_config_error() {
        let err = FileIndex::build(Path::new("/definitely/not/here"), "csv").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}
