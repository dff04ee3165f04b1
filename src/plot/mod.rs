//! Plot rendering (PNG via plotters).

pub mod render;

pub use render::*;
