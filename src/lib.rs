//! `assay-curves` library crate.
//!
//! The binary (`assay`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes
//! - the fitting and rendering stages are reusable on their own
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
