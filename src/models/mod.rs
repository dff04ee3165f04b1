//! Four-parameter logistic response model.
//!
//! The model is implemented as small, pure functions so that the fitter and the
//! plotting code evaluate exactly the same curve.

pub mod model;

pub use model::*;
