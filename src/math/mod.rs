//! Mathematical utilities: grid helpers and the Levenberg–Marquardt solver.

pub mod grid;
pub mod lm;

pub use grid::*;
pub use lm::*;
