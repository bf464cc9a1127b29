//! Report output for dashboard snapshots.

pub mod generator;

pub use generator::*;
