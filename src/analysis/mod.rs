//! Analysis modules.
//!
//! Aggregators that turn a working set into the shape each view draws.

pub mod aggregator;

pub use aggregator::*;
