//! District geography annotation.
//!
//! The map view colors one polygon per district. Before it renders, each
//! feature gets a `percentageVirtual` property for the selected month.

use crate::analysis::VirtualShareMap;
use crate::models::{DistrictMonth, YearMonth};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Feature property holding the district name.
pub const DISTRICT_PROPERTY: &str = "DistrictName";

/// Feature property written with the virtual-learning percentage.
pub const SHARE_PROPERTY: &str = "percentageVirtual";

/// Outcome of annotating a feature collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    /// Features that received a percentage.
    pub annotated: usize,
    /// Features whose district had data for the month.
    pub matched: usize,
}

/// Check that a JSON value is a GeoJSON FeatureCollection.
pub fn validate_collection(value: &Value) -> Result<()> {
    if value.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        bail!("GeoJSON root is not a FeatureCollection");
    }
    if !value.get("features").is_some_and(Value::is_array) {
        bail!("GeoJSON FeatureCollection has no features array");
    }
    Ok(())
}

/// Load a district FeatureCollection.
pub async fn load_geojson(path: &Path) -> Result<Value> {
    info!("Loading geography: {}", path.display());

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read geography: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse geography: {}", path.display()))?;

    validate_collection(&value)
        .with_context(|| format!("Invalid geography: {}", path.display()))?;
    Ok(value)
}

/// Set `percentageVirtual` on every feature from the share map.
///
/// Districts without data for the month get 0.
pub fn annotate_features(
    collection: &mut Value,
    shares: &VirtualShareMap,
    year_month: YearMonth,
) -> AnnotationStats {
    let mut stats = AnnotationStats::default();

    let Some(features) = collection.get_mut("features").and_then(Value::as_array_mut) else {
        return stats;
    };

    for feature in features.iter_mut() {
        let Some(properties) = feature.get_mut("properties").and_then(Value::as_object_mut)
        else {
            continue;
        };

        let percent = match properties.get(DISTRICT_PROPERTY).and_then(Value::as_str) {
            Some(district) => {
                if shares.contains(district, year_month) {
                    stats.matched += 1;
                } else {
                    let key = DistrictMonth::new(district, year_month);
                    debug!("No virtual share for {}", key.feature_key());
                }
                shares.get(district, year_month)
            }
            None => 0.0,
        };

        properties.insert(SHARE_PROPERTY.to_string(), Value::from(percent));
        stats.annotated += 1;
    }

    debug!(
        "Annotated {} features for {} ({} with data)",
        stats.annotated, year_month, stats.matched
    );
    stats
}

/// Write an annotated collection as pretty JSON.
pub async fn write_geojson(path: &Path, collection: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(collection)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write geography: {}", path.display()))?;
    info!("Annotated geography saved to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::virtual_share_per_district_month;
    use crate::models::{LearningModel, Record};
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::TempDir;

    const DISTRICTS: &str = include_str!("../../fixtures/districts.geojson");

    fn record(district: &str, model: LearningModel, total: u64) -> Record {
        Record {
            time_period_start: NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
            school_type: "Elementary".to_string(),
            learning_model: model,
            district_name: district.to_string(),
            enrollment_total: total,
        }
    }

    #[test]
    fn test_annotate_features() {
        let records = vec![
            record("Alpine Union", LearningModel::Virtual, 25),
            record("Alpine Union", LearningModel::InPerson, 75),
        ];
        let shares = virtual_share_per_district_month(&records);
        let mut collection = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "DistrictName": "Alpine Union" } },
                { "type": "Feature", "properties": { "DistrictName": "Nowhere" } },
                { "type": "Feature", "properties": {} }
            ]
        });

        let stats = annotate_features(&mut collection, &shares, YearMonth::new(2021, 3).unwrap());
        assert_eq!(stats, AnnotationStats { annotated: 3, matched: 1 });

        let features = collection["features"].as_array().unwrap();
        assert_eq!(features[0]["properties"][SHARE_PROPERTY], json!(25.0));
        assert_eq!(features[1]["properties"][SHARE_PROPERTY], json!(0.0));
        assert_eq!(features[2]["properties"][SHARE_PROPERTY], json!(0.0));
    }

    #[test]
    fn test_annotate_other_month_is_zero() {
        let records = vec![record("Alpine Union", LearningModel::Virtual, 10)];
        let shares = virtual_share_per_district_month(&records);
        let mut collection: Value = serde_json::from_str(DISTRICTS).unwrap();

        let stats = annotate_features(&mut collection, &shares, YearMonth::new(2020, 1).unwrap());
        assert_eq!(stats.matched, 0);
        assert!(stats.annotated > 0);
    }

    #[test]
    fn test_validate_collection() {
        assert!(validate_collection(&serde_json::from_str(DISTRICTS).unwrap()).is_ok());
        assert!(validate_collection(&json!({ "type": "Feature" })).is_err());
        assert!(validate_collection(&json!({ "type": "FeatureCollection" })).is_err());
    }

    #[test]
    fn test_load_and_write_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("districts.geojson");
        let output = dir.path().join("annotated.geojson");
        std::fs::write(&input, DISTRICTS).unwrap();

        let mut collection = tokio_test::block_on(load_geojson(&input)).unwrap();
        let shares = VirtualShareMap::default();
        annotate_features(&mut collection, &shares, YearMonth::new(2021, 1).unwrap());
        tokio_test::block_on(write_geojson(&output, &collection)).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains(SHARE_PROPERTY));
    }

    #[test]
    fn test_load_rejects_non_collection() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bad.geojson");
        std::fs::write(&input, r#"{"type":"Point","coordinates":[0,0]}"#).unwrap();

        assert!(tokio_test::block_on(load_geojson(&input)).is_err());
    }
}
