//! lmdash - filter and aggregation core of a school learning-model
//! enrollment dashboard.
//!
//! Records are loaded once into a [`store::RecordStore`]. A
//! [`dashboard::Dashboard`] owns the filter selection and the highlight
//! broker, and every event produces a fresh [`dashboard::DashboardSnapshot`]
//! with the data behind each chart.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod filter;
pub mod geo;
pub mod highlight;
pub mod models;
pub mod report;
pub mod store;
