//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.lmdash.toml` files.

use crate::cli::{Args, OutputFormat};
use crate::highlight::DEFAULT_DIMMED_OPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".lmdash.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input data settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Initial filter selection.
    #[serde(default)]
    pub filters: FiltersConfig,

    /// Highlight settings.
    #[serde(default)]
    pub highlight: HighlightConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Default report format.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            format: OutputFormat::default(),
        }
    }
}

fn default_output() -> String {
    "lmdash_report.md".to_string()
}

/// Dataset and geography locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Enrollment CSV path.
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    /// District GeoJSON path (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geography: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            geography: None,
        }
    }
}

fn default_dataset() -> PathBuf {
    PathBuf::from("data/California_Schools_LearningModelData_Final.csv")
}

/// Initial values of the filter controls. "All" means unrestricted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// Month as `YYYY-MM`; the most recent month when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,

    #[serde(default = "default_all")]
    pub district: String,

    #[serde(default = "default_all")]
    pub school_type: String,

    #[serde(default = "default_all")]
    pub learning_model: String,

    /// `All` or `MIN-MAX`.
    #[serde(default = "default_all")]
    pub enrollment_range: String,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            month: None,
            district: default_all(),
            school_type: default_all(),
            learning_model: default_all(),
            enrollment_range: default_all(),
        }
    }
}

fn default_all() -> String {
    crate::filter::ALL.to_string()
}

/// Highlight settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Opacity of marks that do not match the selected model.
    #[serde(default = "default_dimmed_opacity")]
    pub dimmed_opacity: f64,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            dimmed_opacity: default_dimmed_opacity(),
        }
    }
}

fn default_dimmed_opacity() -> f64 {
    DEFAULT_DIMMED_OPACITY
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include the enrollment time series table.
    #[serde(default = "default_true")]
    pub include_time_series: bool,

    /// Include the per-district virtual share table.
    #[serde(default = "default_true")]
    pub include_district_shares: bool,

    /// Maximum district rows in the map table.
    #[serde(default = "default_max_district_rows")]
    pub max_district_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_time_series: true,
            include_district_shares: true,
            max_district_rows: default_max_district_rows(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_district_rows() -> usize {
    20
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings; only
    /// values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref dataset) = args.data {
            self.data.dataset = dataset.clone();
        }
        if let Some(ref geography) = args.geo {
            self.data.geography = Some(geography.clone());
        }

        if let Some(ref month) = args.month {
            self.filters.month = Some(month.clone());
        }
        if let Some(ref district) = args.district {
            self.filters.district = district.clone();
        }
        if let Some(ref school_type) = args.school_type {
            self.filters.school_type = school_type.clone();
        }
        if let Some(ref learning_model) = args.learning_model {
            self.filters.learning_model = learning_model.clone();
        }
        if let Some(ref range) = args.enrollment_range {
            self.filters.enrollment_range = range.clone();
        }

        if let Some(opacity) = args.dimmed_opacity {
            self.highlight.dimmed_opacity = opacity;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.filters.district, "All");
        assert_eq!(config.highlight.dimmed_opacity, 0.2);
        assert_eq!(config.general.format, OutputFormat::Markdown);
        assert!(config.data.geography.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.json"
format = "json"

[data]
dataset = "data/enrollment.csv"
geography = "data/districts.geojson"

[filters]
month = "2021-01"
learning_model = "Virtual"
enrollment_range = "0-199"

[highlight]
dimmed_opacity = 0.35
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.json");
        assert_eq!(config.general.format, OutputFormat::Json);
        assert_eq!(config.data.dataset, PathBuf::from("data/enrollment.csv"));
        assert_eq!(config.filters.month.as_deref(), Some("2021-01"));
        assert_eq!(config.filters.learning_model, "Virtual");
        assert_eq!(config.filters.district, "All");
        assert_eq!(config.highlight.dimmed_opacity, 0.35);
        assert_eq!(config.report.max_district_rows, 20);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[data]"));
        assert!(toml_str.contains("[filters]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.filters.enrollment_range, "All");
    }

    #[test]
    fn test_merge_with_args_prefers_cli() {
        let mut config = Config::default();
        config.filters.district = "Alpine Union".to_string();
        config.filters.school_type = "High".to_string();

        let args = Args::parse_from([
            "lmdash",
            "--data",
            "other.csv",
            "--district",
            "All",
            "--format",
            "json",
        ]);
        config.merge_with_args(&args);

        assert_eq!(config.data.dataset, PathBuf::from("other.csv"));
        assert_eq!(config.filters.district, "All");
        assert_eq!(config.filters.school_type, "High");
        assert_eq!(config.general.format, OutputFormat::Json);
    }

    #[test]
    fn test_config_verbose_raises_log_level() {
        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let args = Args::parse_from(["lmdash"]);
        config.merge_with_args(&args);

        assert!(config.general.verbose);
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        let quiet = Args::parse_from(["lmdash", "--quiet"]);
        assert_eq!(quiet.log_level(config.general.verbose), tracing::Level::ERROR);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[report]\nmax_district_rows = 5\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.report.max_district_rows, 5);
        assert!(config.report.include_time_series);

        std::fs::write(&path, "[report\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
