//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! `.lmdash.toml` configuration and then to built-in defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// lmdash - school learning-model enrollment explorer
///
/// Loads school enrollment records by learning model, applies the
/// dashboard filters and highlight, and writes every chart view as a
/// Markdown or JSON report.
///
/// Examples:
///   lmdash --data enrollment.csv
///   lmdash --data enrollment.csv --month 2021-01 --enrollment-range 0-199
///   lmdash --data enrollment.csv --highlight Virtual --format json
///   lmdash --data enrollment.csv --geo districts.geojson --geo-output map.geojson
///   lmdash --data enrollment.csv --script session.txt
///   lmdash --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Enrollment CSV file
    ///
    /// Columns: TimePeriodStart, SchoolType, LearningModel, DistrictName,
    /// EnrollmentTotal. Defaults to the path in .lmdash.toml.
    #[arg(short, long, value_name = "FILE", env = "LMDASH_DATA")]
    pub data: Option<PathBuf>,

    /// District GeoJSON FeatureCollection to annotate for the map view
    #[arg(long, value_name = "FILE", env = "LMDASH_GEO")]
    pub geo: Option<PathBuf>,

    /// Where to write the annotated GeoJSON
    ///
    /// Defaults to <geo>.annotated.geojson next to the input.
    #[arg(long, value_name = "FILE", requires = "geo")]
    pub geo_output: Option<PathBuf>,

    /// Initial month (YYYY-MM); defaults to the most recent month
    #[arg(short, long, value_name = "YYYY-MM")]
    pub month: Option<String>,

    /// District filter ("All" for every district)
    #[arg(long, value_name = "NAME")]
    pub district: Option<String>,

    /// School type filter ("All" for every type)
    #[arg(long, value_name = "TYPE")]
    pub school_type: Option<String>,

    /// Learning model filter ("All" for every model)
    #[arg(long, value_name = "MODEL")]
    pub learning_model: Option<String>,

    /// Enrollment range filter, "All" or MIN-MAX (inclusive)
    #[arg(long, value_name = "RANGE")]
    pub enrollment_range: Option<String>,

    /// Highlight a learning model, as if its mark was clicked
    #[arg(long, value_name = "MODEL")]
    pub highlight: Option<String>,

    /// Opacity of marks outside the highlighted model (0.0 - 1.0)
    #[arg(long, value_name = "OPACITY")]
    pub dimmed_opacity: Option<f64>,

    /// Replay dashboard commands from a file, one per line
    ///
    /// Commands: slider N, month YYYY-MM, district NAME, school-type TYPE,
    /// model MODEL, enrollment RANGE, click [MODEL], reset.
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Read dashboard commands from stdin until EOF or "quit"
    #[arg(short, long)]
    pub interactive: bool,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .lmdash.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// List months, districts, school types and learning models, then exit
    #[arg(long)]
    pub list: bool,

    /// Exit with code 2 when the final working set is empty
    #[arg(long)]
    pub fail_on_empty: bool,

    /// Generate a default .lmdash.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.interactive && self.script.is_some() {
            return Err("Cannot use both --interactive and --script".to_string());
        }

        if let Some(opacity) = self.dimmed_opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err("Dimmed opacity must be between 0.0 and 1.0".to_string());
            }
        }

        if let Some(ref data) = self.data {
            if !data.is_file() {
                return Err(format!("Data file does not exist: {}", data.display()));
            }
        }

        if let Some(ref geo) = self.geo {
            if !geo.is_file() {
                return Err(format!("Geography file does not exist: {}", geo.display()));
            }
        }

        if let Some(ref script) = self.script {
            if !script.is_file() {
                return Err(format!("Script file does not exist: {}", script.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `general.verbose` from the config file; `--quiet`
    /// wins over both.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
