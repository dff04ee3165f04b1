//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - grouping keys and extracted series (`Concentration`, `SeriesBatch`)
//! - fit outputs (`SigmoidParams`, `FitResult`, `FitQuality`)
//! - run configuration (`FilterParams`, `LogSchema`, `RunConfig`)

pub mod types;

pub use types::*;
