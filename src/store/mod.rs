//! Record store and dataset ingestion.
//!
//! Source rows are validated once at load time. Rows that fail validation
//! are dropped and only counted; nothing downstream ever sees a partial
//! or defaulted record.

use crate::models::{LearningModel, Record, YearMonth};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Date layouts accepted for `TimePeriodStart`.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Datetime layouts accepted for `TimePeriodStart` (no offset).
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// A row as it comes out of the CSV layer, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(rename = "TimePeriodStart", default)]
    pub time_period_start: Option<String>,
    #[serde(rename = "SchoolType", default)]
    pub school_type: Option<String>,
    #[serde(rename = "LearningModel", default)]
    pub learning_model: Option<String>,
    #[serde(rename = "DistrictName", default)]
    pub district_name: Option<String>,
    #[serde(rename = "EnrollmentTotal", default)]
    pub enrollment_total: Option<String>,
}

/// Counters collected while ingesting a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    pub dropped: usize,
}

impl IngestStats {
    pub fn total(&self) -> usize {
        self.accepted + self.dropped
    }
}

/// Immutable, validated dataset.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    /// Build a store from already validated records.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct months in chronological order (the time slider domain).
    pub fn year_months(&self) -> Vec<YearMonth> {
        self.records
            .iter()
            .map(Record::year_month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct district names, sorted.
    pub fn districts(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.district_name.as_str()))
    }

    /// Distinct school types, sorted.
    pub fn school_types(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.school_type.as_str()))
    }

    /// Distinct learning models in legend order.
    pub fn learning_models(&self) -> Vec<LearningModel> {
        self.records
            .iter()
            .map(|r| r.learning_model.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Validate raw rows into a record store.
pub fn ingest<I>(rows: I) -> (RecordStore, IngestStats)
where
    I: IntoIterator<Item = RawRow>,
{
    let mut stats = IngestStats::default();
    let mut records = Vec::new();

    for row in rows {
        match validate_row(&row) {
            Some(record) => {
                records.push(record);
                stats.accepted += 1;
            }
            None => stats.dropped += 1,
        }
    }

    log_ingest(&stats);
    (RecordStore::new(records), stats)
}

fn log_ingest(stats: &IngestStats) {
    if stats.accepted == 0 && stats.dropped > 0 {
        warn!("All {} dataset rows were invalid and dropped", stats.dropped);
    } else {
        info!(
            "Ingested {} records ({} invalid rows dropped)",
            stats.accepted, stats.dropped
        );
    }
}

/// Turn one raw row into a record, or `None` if any field is invalid.
pub fn validate_row(row: &RawRow) -> Option<Record> {
    let time_period_start = parse_date(row.time_period_start.as_deref()?)?;
    let school_type = non_empty(row.school_type.as_deref()?)?;
    let learning_model = non_empty(row.learning_model.as_deref()?)?;
    let district_name = non_empty(row.district_name.as_deref()?)?;
    let enrollment_total = row.enrollment_total.as_deref()?.trim().parse::<u64>().ok()?;

    Some(Record {
        time_period_start,
        school_type,
        learning_model: LearningModel::from(learning_model),
        district_name,
        enrollment_total,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse a period start date in any of the supported layouts.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Parse CSV text into raw rows. Rows the CSV layer cannot decode are
/// returned as empty rows so they are counted as dropped.
pub fn parse_csv(content: &[u8]) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    // A header problem means the file is not a dataset at all.
    reader.headers().context("Failed to read dataset header")?;

    let rows = reader
        .deserialize::<RawRow>()
        .map(|row| {
            row.unwrap_or_else(|e| {
                debug!("Undecodable dataset row: {}", e);
                RawRow::default()
            })
        })
        .collect();

    Ok(rows)
}

/// Load and validate a dataset CSV file.
pub async fn load_csv(path: &Path, show_progress: bool) -> Result<(RecordStore, IngestStats)> {
    info!("Loading dataset: {}", path.display());

    let spinner = show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Reading {}", path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;

    if let Some(ref pb) = spinner {
        pb.set_message(format!("Validating {} bytes", content.len()));
    }

    let rows = parse_csv(&content)
        .with_context(|| format!("Failed to parse dataset: {}", path.display()))?;
    let (store, stats) = ingest(rows);

    if let Some(pb) = spinner {
        pb.finish_with_message(format!(
            "Loaded {} records ({} dropped)",
            stats.accepted, stats.dropped
        ));
    }

    Ok((store, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = include_str!("../../fixtures/enrollment_sample.csv");

    fn raw(date: &str, school: &str, model: &str, district: &str, total: &str) -> RawRow {
        RawRow {
            time_period_start: Some(date.to_string()),
            school_type: Some(school.to_string()),
            learning_model: Some(model.to_string()),
            district_name: Some(district.to_string()),
            enrollment_total: Some(total.to_string()),
        }
    }

    #[test]
    fn test_validate_row_accepts_and_trims() {
        let record = validate_row(&raw(
            "2021-01-15",
            " Elementary ",
            "Virtual",
            " Alpine Union ",
            " 120 ",
        ))
        .unwrap();

        assert_eq!(record.school_type, "Elementary");
        assert_eq!(record.district_name, "Alpine Union");
        assert_eq!(record.learning_model, LearningModel::Virtual);
        assert_eq!(record.enrollment_total, 120);
        assert_eq!(record.year_month(), YearMonth::new(2021, 1).unwrap());
    }

    #[test]
    fn test_validate_row_rejects_invalid_fields() {
        let good = raw("2021-01-01", "High", "Hybrid", "D1", "10");
        assert!(validate_row(&good).is_some());

        assert!(validate_row(&RawRow {
            time_period_start: None,
            ..good.clone()
        })
        .is_none());
        assert!(validate_row(&raw("not a date", "High", "Hybrid", "D1", "10")).is_none());
        assert!(validate_row(&raw("2021-01-01", "   ", "Hybrid", "D1", "10")).is_none());
        assert!(validate_row(&raw("2021-01-01", "High", "", "D1", "10")).is_none());
        assert!(validate_row(&raw("2021-01-01", "High", "Hybrid", "D1", "-5")).is_none());
        assert!(validate_row(&raw("2021-01-01", "High", "Hybrid", "D1", "ten")).is_none());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(parse_date("2021-03-04"), Some(expected));
        assert_eq!(parse_date("2021/03/04"), Some(expected));
        assert_eq!(parse_date("03/04/2021"), Some(expected));
        assert_eq!(parse_date("2021-03-04T08:00:00"), Some(expected));
        assert_eq!(parse_date("2021-03-04T08:00:00Z"), Some(expected));
        assert_eq!(parse_date("2021-02-30"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_ingest_counts_dropped_rows() {
        let rows = vec![
            raw("2021-01-01", "High", "Virtual", "D1", "100"),
            raw("bad", "High", "Virtual", "D1", "100"),
            raw("2021-02-01", "High", "Closed", "D2", "x"),
        ];

        let (store, stats) = ingest(rows);
        assert_eq!(store.len(), 1);
        assert_eq!(stats, IngestStats { accepted: 1, dropped: 2 });
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_store_distinct_values() {
        let rows = vec![
            raw("2021-02-01", "High", "Virtual", "Beta", "100"),
            raw("2021-01-01", "Elementary", "Hybrid", "Alpha", "50"),
            raw("2021-02-09", "High", "Virtual", "Alpha", "75"),
        ];
        let (store, _) = ingest(rows);

        let months: Vec<String> = store.year_months().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, vec!["2021-01", "2021-02"]);
        assert_eq!(store.districts(), vec!["Alpha", "Beta"]);
        assert_eq!(store.school_types(), vec!["Elementary", "High"]);
        assert_eq!(
            store.learning_models(),
            vec![LearningModel::Virtual, LearningModel::Hybrid]
        );
    }

    #[test]
    fn test_parse_csv_fixture() {
        let rows = parse_csv(SAMPLE.as_bytes()).unwrap();
        let (store, stats) = ingest(rows);

        assert!(stats.dropped >= 2);
        assert!(store.len() > 10);
        assert!(store.records().iter().all(|r| !r.district_name.is_empty()));
    }

    #[test]
    fn test_parse_csv_ragged_and_missing_columns() {
        let csv = "TimePeriodStart,SchoolType,LearningModel,DistrictName,EnrollmentTotal\n\
                   2021-01-01,High,Virtual,D1,10\n\
                   2021-01-01,High,Virtual\n\
                   2021-01-01,High,Hybrid,D1,20,extra\n";
        let (store, stats) = ingest(parse_csv(csv.as_bytes()).unwrap());

        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(store.records()[1].enrollment_total, 20);
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let (store, stats) = tokio_test::block_on(load_csv(file.path(), false)).unwrap();
        assert_eq!(store.len(), stats.accepted);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_load_csv_missing_file() {
        let result = tokio_test::block_on(load_csv(Path::new("/nonexistent/data.csv"), false));
        assert!(result.is_err());
    }
}
