//! Filter selection and the filter pipeline.
//!
//! Every dimension is a pure predicate over records; the working set is
//! their conjunction, recomputed from the full store on every change.

use crate::models::{LearningModel, Record, YearMonth};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::error;

/// UI sentinel meaning "no restriction".
pub const ALL: &str = "All";

/// Errors produced while parsing filter values from UI strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("invalid enrollment range '{0}' (expected 'All' or 'MIN-MAX')")]
    InvalidRange(String),

    #[error("enrollment range minimum {min} exceeds maximum {max}")]
    InvertedRange { min: u64, max: u64 },
}

/// Exact-match filter on a categorical dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter<T> {
    Unrestricted,
    Exact(T),
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Filter::Unrestricted
    }
}

impl<T: PartialEq> Filter<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Filter::Unrestricted => true,
            Filter::Exact(expected) => expected == value,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Filter::Unrestricted)
    }
}

impl<T: FromStr> FromStr for Filter<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == ALL {
            Ok(Filter::Unrestricted)
        } else {
            s.parse().map(Filter::Exact)
        }
    }
}

impl<T: fmt::Display> fmt::Display for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Unrestricted => f.write_str(ALL),
            Filter::Exact(value) => write!(f, "{}", value),
        }
    }
}

/// Inclusive numeric range filter on enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeFilter {
    #[default]
    Unrestricted,
    Range { min: u64, max: u64 },
}

impl RangeFilter {
    pub fn matches(&self, value: u64) -> bool {
        match *self {
            RangeFilter::Unrestricted => true,
            RangeFilter::Range { min, max } => value >= min && value <= max,
        }
    }
}

impl FromStr for RangeFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == ALL {
            return Ok(RangeFilter::Unrestricted);
        }

        let invalid = || FilterParseError::InvalidRange(s.to_string());
        let (min, max) = s.split_once('-').ok_or_else(invalid)?;
        let min: u64 = min.trim().parse().map_err(|_| invalid())?;
        let max: u64 = max.trim().parse().map_err(|_| invalid())?;

        if min > max {
            return Err(FilterParseError::InvertedRange { min, max });
        }
        Ok(RangeFilter::Range { min, max })
    }
}

impl fmt::Display for RangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeFilter::Unrestricted => f.write_str(ALL),
            RangeFilter::Range { min, max } => write!(f, "{}-{}", min, max),
        }
    }
}

/// The current value of every filter dimension.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSelection {
    /// Selected month; `None` only before initialization or on an empty store.
    pub year_month: Option<YearMonth>,
    pub district: Filter<String>,
    pub school_type: Filter<String>,
    pub learning_model: Filter<LearningModel>,
    pub enrollment: RangeFilter,
}

impl FilterSelection {
    /// Initial state: the most recent month and no other restriction.
    pub fn initial(months: &[YearMonth]) -> Self {
        Self {
            year_month: months.last().copied(),
            ..Self::default()
        }
    }
}

/// Keep records whose period falls in the given calendar month.
///
/// An empty input is a caller bug, not bad data: it is reported and
/// degrades to an empty result.
pub fn apply_time_filter<'a>(records: &[&'a Record], year_month: YearMonth) -> Vec<&'a Record> {
    if records.is_empty() {
        error!("Empty record set passed to time filter ({})", year_month);
        return Vec::new();
    }

    records
        .iter()
        .copied()
        .filter(|r| r.year_month() == year_month)
        .collect()
}

pub fn apply_district<'a>(records: Vec<&'a Record>, filter: &Filter<String>) -> Vec<&'a Record> {
    retain_matching(records, filter, |r| &r.district_name)
}

pub fn apply_school_type<'a>(records: Vec<&'a Record>, filter: &Filter<String>) -> Vec<&'a Record> {
    retain_matching(records, filter, |r| &r.school_type)
}

pub fn apply_learning_model<'a>(
    records: Vec<&'a Record>,
    filter: &Filter<LearningModel>,
) -> Vec<&'a Record> {
    retain_matching(records, filter, |r| &r.learning_model)
}

fn retain_matching<'a, T: PartialEq>(
    records: Vec<&'a Record>,
    filter: &Filter<T>,
    field: impl Fn(&Record) -> &T,
) -> Vec<&'a Record> {
    if filter.is_unrestricted() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| filter.matches(field(r)))
        .collect()
}

/// Inclusive bounds on `enrollment_total`; `Unrestricted` passes everything.
pub fn apply_enrollment_range<'a>(records: Vec<&'a Record>, range: RangeFilter) -> Vec<&'a Record> {
    match range {
        RangeFilter::Unrestricted => records,
        RangeFilter::Range { .. } => records
            .into_iter()
            .filter(|r| range.matches(r.enrollment_total))
            .collect(),
    }
}

/// Composes the active filters of a selection over a record set.
#[derive(Debug, Clone, Copy)]
pub struct FilterPipeline<'s> {
    selection: &'s FilterSelection,
}

impl<'s> FilterPipeline<'s> {
    pub fn new(selection: &'s FilterSelection) -> Self {
        Self { selection }
    }

    /// All active predicates, time first.
    ///
    /// An empty record set is reported at error level whether or not a
    /// month is selected, and yields an empty working set.
    pub fn working_set<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        if records.is_empty() {
            error!("Empty record set passed to filter pipeline");
            return Vec::new();
        }

        let all: Vec<&Record> = records.iter().collect();
        let timed = match self.selection.year_month {
            Some(year_month) => apply_time_filter(&all, year_month),
            None => all,
        };
        self.apply_categorical(timed)
    }

    /// Every predicate except the time dimension.
    pub fn timeline_set<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        self.apply_categorical(records.iter().collect())
    }

    fn apply_categorical<'a>(&self, records: Vec<&'a Record>) -> Vec<&'a Record> {
        let s = self.selection;
        let records = apply_district(records, &s.district);
        let records = apply_school_type(records, &s.school_type);
        let records = apply_learning_model(records, &s.learning_model);
        apply_enrollment_range(records, s.enrollment)
    }
}
