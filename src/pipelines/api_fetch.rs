//! Fetch a JSON API feed and publish it as a whole dataset with a CSV
//! resource and a GeoJSON resource. The feed's nested `coordinates`
//! object is flattened into `lat`/`lon` (WGS84) and `itm-x`/`itm-y`
//! (national grid) columns, and epoch-seconds fields become dates.

use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::ckan::Dataset;
use crate::config::ApiFetchConfig;
use crate::convert::tabular;
use crate::error::{EtlError, Result};
use crate::{publisher, sources};

pub async fn run(config: &ApiFetchConfig) -> Result<()> {
    let feed = sources::http::fetch_json(&config.source_url).await?;
    let rows = transform_rows(&feed, config)?;
    info!("fetched {} rows", rows.len());

    let workdir = tempfile::tempdir()?;
    let csv_path = workdir.path().join(format!("{}.csv", config.dataset_name));
    let geojson_path = workdir
        .path()
        .join(format!("{}.geojson", config.dataset_name));

    let table =
        tabular::rows_from_json(&Value::Array(rows.iter().cloned().map(Value::Object).collect()))?;
    tabular::write_csv(&table, &csv_path)?;
    write_geojson(&rows, &geojson_path)?;

    let dataset = Dataset {
        name: config.dataset_name.clone(),
        title: Some(config.dataset_title.clone()),
        owner_org: Some(config.org_id.clone()),
        ..Default::default()
    };
    let client = config.ckan.client();
    publisher::publish_dataset(
        &client,
        &config.org_id,
        &dataset,
        &[
            ("CSV".to_string(), "CSV".to_string(), csv_path),
            ("GeoJSON".to_string(), "GeoJSON".to_string(), geojson_path),
        ],
    )
    .await
}

/// Apply the feed transforms row by row: id filtering, forced string
/// fields, epoch-seconds dates and coordinate flattening.
pub fn transform_rows(feed: &Value, config: &ApiFetchConfig) -> Result<Vec<Map<String, Value>>> {
    let items = feed
        .as_array()
        .ok_or_else(|| EtlError::Source("expected a JSON array of records".to_string()))?;

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(source) = item.as_object() else {
            warn!("record {index} is not an object, skipping");
            continue;
        };
        if let Some(id) = source.get("id").and_then(Value::as_str) {
            if config.skip_ids.iter().any(|skip| skip == id) {
                continue;
            }
        }

        let mut row = source.clone();
        for field in &config.string_fields {
            if let Some(value) = row.get_mut(field) {
                if !value.is_null() && !value.is_string() {
                    *value = Value::String(value.to_string());
                }
            }
        }
        for field in &config.epoch_date_fields {
            let seconds = row
                .get(field)
                .and_then(|v| v.get("seconds"))
                .and_then(Value::as_i64);
            if let Some(seconds) = seconds {
                let date = DateTime::from_timestamp(seconds, 0)
                    .map(|t| t.date_naive().format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                row.insert(field.clone(), Value::String(date));
            }
        }

        let coordinates = row.get("coordinates").cloned();
        match &coordinates {
            Some(c) => {
                row.insert(
                    "lat".to_string(),
                    c.pointer("/geopoint/latitude").cloned().unwrap_or(Value::Null),
                );
                row.insert(
                    "lon".to_string(),
                    c.pointer("/geopoint/longitude").cloned().unwrap_or(Value::Null),
                );
                row.insert(
                    "itm-x".to_string(),
                    c.pointer("/itm/x").cloned().unwrap_or(Value::Null),
                );
                row.insert(
                    "itm-y".to_string(),
                    c.pointer("/itm/y").cloned().unwrap_or(Value::Null),
                );
            }
            None => warn!("record {index} has no coordinates"),
        }
        row.remove("coordinates");
        rows.push(row);
    }
    Ok(rows)
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// FeatureCollection of point features: geometry from `lon`/`lat`, the
/// remaining columns as properties. Rows without usable coordinates are
/// logged and skipped.
fn write_geojson(rows: &[Map<String, Value>], out: &std::path::Path) -> Result<()> {
    let mut features = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let (Some(lon), Some(lat)) = (
            coordinate(row.get("lon")),
            coordinate(row.get("lat")),
        ) else {
            warn!("row {index} has no usable lon/lat, left out of the GeoJSON output");
            continue;
        };
        let mut properties = row.clone();
        properties.remove("lat");
        properties.remove("lon");
        features.push(geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                lon, lat,
            ]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    let collection = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    let file = std::io::BufWriter::new(std::fs::File::create(out)?);
    serde_json::to_writer_pretty(file, &collection)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CkanTarget;
    use serde_json::json;

    fn config() -> ApiFetchConfig {
        ApiFetchConfig {
            source_url: "https://example.org/api".to_string(),
            dataset_name: "stations".to_string(),
            dataset_title: "Stations".to_string(),
            org_id: "org".to_string(),
            skip_ids: vec!["copyrights-1".to_string()],
            string_fields: vec!["contactName".to_string()],
            epoch_date_fields: vec!["createdAt".to_string(), "updatedAt".to_string()],
            ckan: CkanTarget {
                base_url: "https://catalog.example.org".to_string(),
                api_key: "key".to_string(),
            },
        }
    }

    fn feed() -> Value {
        json!([
            {
                "id": "copyrights-1",
                "contactName": "dropped"
            },
            {
                "id": "st-1",
                "contactName": 42,
                "createdAt": {"seconds": 1_600_000_000},
                "coordinates": {
                    "geopoint": {"latitude": 32.1, "longitude": 34.8},
                    "itm": {"x": 180000.0, "y": 665000.0}
                }
            }
        ])
    }

    #[test]
    fn test_transform_rows() {
        let rows = transform_rows(&feed(), &config()).unwrap();
        assert_eq!(rows.len(), 1, "the copyrights record is filtered out");
        let row = &rows[0];
        assert_eq!(row["contactName"], "42");
        assert_eq!(row["createdAt"], "2020-09-13");
        assert_eq!(row["lat"], 32.1);
        assert_eq!(row["lon"], 34.8);
        assert_eq!(row["itm-x"], 180000.0);
        assert!(!row.contains_key("coordinates"));
    }

    #[test]
    fn test_geojson_features_drop_lat_lon_from_properties() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("stations.geojson");
        let rows = transform_rows(&feed(), &config()).unwrap();
        write_geojson(&rows, &out).unwrap();

        let value: Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let feature = &value["features"][0];
        assert_eq!(feature["geometry"]["coordinates"], json!([34.8, 32.1]));
        assert!(feature["properties"].get("lat").is_none());
        assert_eq!(feature["properties"]["itm-y"], 665000.0);
    }
}
