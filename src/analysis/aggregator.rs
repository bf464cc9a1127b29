//! Chart aggregations over a working set.
//!
//! Every function here is pure: it borrows the records it is given and
//! returns a freshly built shape. An empty input is a valid input and
//! produces empty or zero-filled output.

use crate::models::{
    CrossTabCell, DistrictMonth, DistrictShare, LearningModel, ModelShare, Record, SizeGroup,
    SizeGroupCount, TimeSeriesPoint, YearMonth,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Width of each fixed enrollment bucket.
pub const SIZE_GROUP_WIDTH: u64 = 200;

/// Lower bound of the open-ended bucket; fixed buckets cover `0..OPEN_GROUP_MIN`.
pub const OPEN_GROUP_MIN: u64 = 800;

/// Display ceiling of the open-ended bucket when the data exceeds it.
pub const OPEN_GROUP_CAP: u64 = 999;

/// Compute the enrollment buckets for a working set.
///
/// Four 200-wide half-open buckets, then an "800+" bucket whose ceiling
/// follows the largest enrollment in the set (capped at 999). The last
/// bucket's membership test is `>= 800`, so nothing above the ceiling is
/// lost.
pub fn size_groups(records: &[&Record]) -> Vec<SizeGroup> {
    let max_enrollment = records.iter().map(|r| r.enrollment_total).max();

    let mut groups: Vec<SizeGroup> = (0..OPEN_GROUP_MIN / SIZE_GROUP_WIDTH)
        .map(|i| {
            let min = i * SIZE_GROUP_WIDTH;
            let max = min + SIZE_GROUP_WIDTH;
            SizeGroup {
                min,
                max,
                label: format!("{}-{}", min, max - 1),
                open_ended: false,
            }
        })
        .collect();

    let ceiling = match max_enrollment {
        Some(max) if max <= OPEN_GROUP_CAP => max,
        _ => OPEN_GROUP_CAP,
    };
    groups.push(SizeGroup {
        min: OPEN_GROUP_MIN,
        max: ceiling,
        label: format!("{}+", OPEN_GROUP_MIN),
        open_ended: true,
    });

    groups
}

/// Models a categorical chart shows: the fixed four plus anything observed.
pub fn chart_models(records: &[&Record]) -> Vec<LearningModel> {
    LearningModel::KNOWN
        .iter()
        .cloned()
        .chain(records.iter().map(|r| r.learning_model.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Count records per (size group, learning model), zero-filled across the
/// full group x model product.
pub fn size_group_by_model(records: &[&Record], groups: &[SizeGroup]) -> Vec<SizeGroupCount> {
    let models = chart_models(records);
    let mut counts: HashMap<(usize, &LearningModel), usize> = HashMap::new();

    for record in records {
        if let Some(index) = groups.iter().position(|g| g.contains(record.enrollment_total)) {
            *counts.entry((index, &record.learning_model)).or_default() += 1;
        }
    }

    groups
        .iter()
        .enumerate()
        .flat_map(|(index, group)| {
            models.iter().map(move |model| (index, group, model))
        })
        .map(|(index, group, model)| SizeGroupCount {
            size_group: group.label.clone(),
            learning_model: model.clone(),
            count: counts.get(&(index, model)).copied().unwrap_or(0),
        })
        .collect()
}

/// Sum enrollment per learning model and each model's share of the total.
pub fn model_enrollment_share(records: &[&Record]) -> Vec<ModelShare> {
    let mut sums: BTreeMap<&LearningModel, u64> = BTreeMap::new();
    for record in records {
        *sums.entry(&record.learning_model).or_default() += record.enrollment_total;
    }

    let total: u64 = sums.values().sum();

    sums.into_iter()
        .map(|(model, enrollment)| ModelShare {
            learning_model: model.clone(),
            enrollment,
            percent: percentage(enrollment, total),
        })
        .collect()
}

/// Percentage of virtual enrollment per district and month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VirtualShareMap {
    shares: BTreeMap<DistrictMonth, f64>,
}

impl VirtualShareMap {
    /// Lookup with missing combinations defined as 0.
    pub fn get(&self, district: &str, year_month: YearMonth) -> f64 {
        self.shares
            .get(&DistrictMonth::new(district, year_month))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn contains(&self, district: &str, year_month: YearMonth) -> bool {
        self.shares
            .contains_key(&DistrictMonth::new(district, year_month))
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DistrictMonth, f64)> {
        self.shares.iter().map(|(k, v)| (k, *v))
    }

    /// Every district's share in one month, sorted by district.
    pub fn for_month(&self, year_month: YearMonth) -> Vec<DistrictShare> {
        self.iter()
            .filter(|(key, _)| key.year_month == year_month)
            .map(|(key, percent)| DistrictShare {
                district: key.district.clone(),
                percent_virtual: percent,
            })
            .collect()
    }
}

/// Build the virtual-share map over the whole dataset.
pub fn virtual_share_per_district_month(records: &[Record]) -> VirtualShareMap {
    let mut totals: BTreeMap<DistrictMonth, (u64, u64)> = BTreeMap::new();

    for record in records {
        let entry = totals
            .entry(DistrictMonth::new(
                record.district_name.as_str(),
                record.year_month(),
            ))
            .or_default();
        entry.0 += record.enrollment_total;
        if record.learning_model.is_virtual() {
            entry.1 += record.enrollment_total;
        }
    }

    let shares = totals
        .into_iter()
        .map(|(key, (total, virtual_total))| {
            let percent = if total == 0 {
                0.0
            } else {
                100.0 * virtual_total as f64 / total as f64
            };
            (key, percent)
        })
        .collect();

    VirtualShareMap { shares }
}

/// Count records per (school type, learning model) for observed pairs.
pub fn cross_tab_type_model(records: &[&Record]) -> Vec<CrossTabCell> {
    let mut counts: BTreeMap<(&str, &LearningModel), usize> = BTreeMap::new();
    for record in records {
        *counts
            .entry((record.school_type.as_str(), &record.learning_model))
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((school_type, model), count)| CrossTabCell {
            school_type: school_type.to_string(),
            learning_model: model.clone(),
            count,
        })
        .collect()
}

/// Enrollment per (month, learning model), in chronological order.
pub fn enrollment_time_series(records: &[&Record]) -> Vec<TimeSeriesPoint> {
    let mut sums: BTreeMap<(YearMonth, &LearningModel), u64> = BTreeMap::new();
    for record in records {
        *sums
            .entry((record.year_month(), &record.learning_model))
            .or_default() += record.enrollment_total;
    }

    sums.into_iter()
        .map(|((year_month, model), value)| TimeSeriesPoint {
            date: year_month.first_day(),
            learning_model: model.clone(),
            value,
        })
        .collect()
}

/// Monthly enrollment totals across all models.
pub fn monthly_totals(points: &[TimeSeriesPoint]) -> Vec<(YearMonth, u64)> {
    let mut totals: BTreeMap<YearMonth, u64> = BTreeMap::new();
    for point in points {
        *totals.entry(YearMonth::from_date(point.date)).or_default() += point.value;
    }
    totals.into_iter().collect()
}

/// Districts with the highest virtual share, highest first.
pub fn top_virtual_districts(shares: &[DistrictShare], n: usize) -> Vec<DistrictShare> {
    let mut sorted = shares.to_vec();
    sorted.sort_by(|a, b| {
        b.percent_virtual
            .partial_cmp(&a.percent_virtual)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.district.cmp(&b.district))
    });
    sorted.truncate(n);
    sorted
}

/// `part / total` as a percentage rounded to two decimals; 0 when total is 0.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
