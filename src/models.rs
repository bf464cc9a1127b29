//! Data models for the enrollment dashboard.
//!
//! This module contains the core data structures shared by the store,
//! the filter pipeline, the aggregators and the report generator.

use crate::dashboard::DashboardSnapshot;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a `YYYY-MM` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid year-month '{0}' (expected YYYY-MM)")]
pub struct ParseYearMonthError(pub String);

/// A calendar month, the grouping key for every time-based operation.
///
/// Internally normalized to the first day of the month, so ordering is
/// chronological and the day component never leaks into comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth(NaiveDate);

impl YearMonth {
    /// Build a year-month, returning `None` for an invalid month.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// The year-month a date falls in.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// First calendar day of the month (the time-series x value).
    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// Human-readable label, e.g. "June 2021".
    pub fn label(&self) -> String {
        self.0.format("%B %Y").to_string()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for YearMonth {
    type Err = ParseYearMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (year, month) = trimmed
            .split_once('-')
            .ok_or_else(|| ParseYearMonthError(s.to_string()))?;

        let year: i32 = year
            .parse()
            .map_err(|_| ParseYearMonthError(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| ParseYearMonthError(s.to_string()))?;

        Self::new(year, month).ok_or_else(|| ParseYearMonthError(s.to_string()))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Instructional mode of a school for a given month.
///
/// The four observed labels get their own variants; any other label is
/// kept verbatim so new modes flow through every view unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LearningModel {
    Virtual,
    Hybrid,
    InPerson,
    Closed,
    Other(String),
}

impl LearningModel {
    /// The fixed set of models every categorical chart shows, in legend order.
    pub const KNOWN: [LearningModel; 4] = [
        LearningModel::Virtual,
        LearningModel::Hybrid,
        LearningModel::InPerson,
        LearningModel::Closed,
    ];

    /// Source label of the model.
    pub fn as_str(&self) -> &str {
        match self {
            LearningModel::Virtual => "Virtual",
            LearningModel::Hybrid => "Hybrid",
            LearningModel::InPerson => "In-person",
            LearningModel::Closed => "Closed",
            LearningModel::Other(label) => label,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, LearningModel::Virtual)
    }
}

impl fmt::Display for LearningModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for LearningModel {
    fn from(s: &str) -> Self {
        match s {
            "Virtual" => LearningModel::Virtual,
            "Hybrid" => LearningModel::Hybrid,
            "In-person" => LearningModel::InPerson,
            "Closed" => LearningModel::Closed,
            other => LearningModel::Other(other.to_string()),
        }
    }
}

impl From<String> for LearningModel {
    fn from(s: String) -> Self {
        LearningModel::from(s.as_str())
    }
}

impl From<LearningModel> for String {
    fn from(model: LearningModel) -> Self {
        model.as_str().to_string()
    }
}

impl FromStr for LearningModel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LearningModel::from(s.trim()))
    }
}

/// One validated observation: a school type in a district, for one month,
/// under one learning model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Start of the reporting period; only its month matters downstream.
    pub time_period_start: NaiveDate,
    pub school_type: String,
    pub learning_model: LearningModel,
    pub district_name: String,
    pub enrollment_total: u64,
}

impl Record {
    /// The month this record is grouped under.
    pub fn year_month(&self) -> YearMonth {
        YearMonth::from_date(self.time_period_start)
    }
}

/// Enrollment bucket used by the stacked bar chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeGroup {
    /// Inclusive lower bound.
    pub min: u64,
    /// Exclusive upper bound for fixed buckets; display ceiling for the
    /// open-ended bucket.
    pub max: u64,
    /// Axis label, e.g. "200-399" or "800+".
    pub label: String,
    /// The last bucket accepts every enrollment at or above `min`.
    pub open_ended: bool,
}

impl SizeGroup {
    /// Whether an enrollment total falls into this bucket.
    pub fn contains(&self, enrollment: u64) -> bool {
        if self.open_ended {
            enrollment >= self.min
        } else {
            enrollment >= self.min && enrollment < self.max
        }
    }
}

/// Count of records for one (size group, learning model) bar segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeGroupCount {
    pub size_group: String,
    pub learning_model: LearningModel,
    pub count: usize,
}

/// Enrollment total and share of one learning model (a bubble).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelShare {
    pub learning_model: LearningModel,
    pub enrollment: u64,
    /// Percentage of the total, rounded to two decimals.
    pub percent: f64,
}

/// One heatmap cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTabCell {
    pub school_type: String,
    pub learning_model: LearningModel,
    pub count: usize,
}

/// One point of the per-model enrollment time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub learning_model: LearningModel,
    pub value: u64,
}

/// Key of the virtual-share map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DistrictMonth {
    pub district: String,
    pub year_month: YearMonth,
}

impl DistrictMonth {
    pub fn new(district: impl Into<String>, year_month: YearMonth) -> Self {
        Self {
            district: district.into(),
            year_month,
        }
    }

    /// String form used on map features: `{district}-{month}-{year}`.
    pub fn feature_key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.district,
            self.year_month.month(),
            self.year_month.year()
        )
    }
}

/// Virtual-learning percentage of one district in the selected month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictShare {
    pub district: String,
    pub percent_virtual: f64,
}

/// A chart row together with its highlight opacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlighted<T> {
    #[serde(flatten)]
    pub row: T,
    pub opacity: f64,
}

/// Metadata about a generated dashboard report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the dataset the report was built from.
    pub dataset: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of valid records in the store.
    pub records_loaded: usize,
    /// Number of source rows rejected at ingestion.
    pub rows_dropped: usize,
    /// Number of events replayed before the snapshot was taken.
    pub events_applied: usize,
    /// Wall-clock time spent loading and computing, in seconds.
    pub duration_seconds: f64,
}

/// The complete dashboard report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub snapshot: DashboardSnapshot,
}
