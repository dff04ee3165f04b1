//! Input/output helpers.
//!
//! - testing-database load + filtering (`metadata`)
//! - one-shot log file index (`discovery`)
//! - windowed series extraction (`extract`)
//! - input path resolution (`paths`)
//! - contributing-file manifest (`manifest`)
//! - fitted parameter JSON (`export`)

pub mod discovery;
pub mod export;
pub mod extract;
pub mod manifest;
pub mod metadata;
pub mod paths;

pub use discovery::*;
pub use export::*;
pub use extract::*;
pub use manifest::*;
pub use metadata::*;
pub use paths::*;
