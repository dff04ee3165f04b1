//! Reporting utilities: terminal summaries of runs and fits.

pub mod format;

pub use format::*;
