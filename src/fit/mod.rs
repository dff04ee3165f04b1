//! Aggregation, fitting and ordering.
//!
//! Responsibilities:
//!
//! - collect extracted series per concentration (`aggregate`)
//! - fit the logistic per group and derive the inflection point (`fitter`)
//! - order fitted curves by concentration (`order`)

pub mod aggregate;
pub mod fitter;
pub mod order;

pub use aggregate::*;
pub use fitter::*;
pub use order::*;
