//! Geospatial conversion over a real shapefile written into a temp dir:
//! attribute extraction, point lat/lon columns, reprojection from the
//! national grid, and the derived-format outputs.

use std::path::PathBuf;

use catalog_etl::convert::geo;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::Point;

/// Two stations on the national grid; (219529.584, 626907.39) is the
/// grid's false origin, which reprojects to roughly (35.2045, 31.7344).
fn write_fixture(dir: &std::path::Path) -> PathBuf {
    let shp_path = dir.join("stations.shp");
    let table = TableWriterBuilder::new()
        .add_character_field(FieldName::try_from("name").unwrap(), 50)
        .add_numeric_field(FieldName::try_from("riders").unwrap(), 10, 2);
    let mut writer = shapefile::Writer::from_path(&shp_path, table).unwrap();

    let mut first = Record::default();
    first.insert(
        "name".to_string(),
        FieldValue::Character(Some("Central".to_string())),
    );
    first.insert("riders".to_string(), FieldValue::Numeric(Some(1200.0)));
    writer
        .write_shape_and_record(&Point::new(219529.584, 626907.39), &first)
        .unwrap();

    let mut second = Record::default();
    second.insert(
        "name".to_string(),
        FieldValue::Character(Some("Harbor".to_string())),
    );
    second.insert("riders".to_string(), FieldValue::Numeric(Some(450.0)));
    writer
        .write_shape_and_record(&Point::new(210000.0, 630000.0), &second)
        .unwrap();

    drop(writer);
    shp_path
}

#[test]
fn test_read_layer_native_grid() {
    let dir = tempfile::tempdir().unwrap();
    let shp_path = write_fixture(dir.path());

    let layer = geo::read_layer(&shp_path, false).unwrap();
    assert_eq!(
        layer.field_names,
        vec!["name", "riders", "lat", "lon"],
        "attribute columns plus the appended point columns"
    );
    assert_eq!(layer.records.len(), 2);
    let first = &layer.records[0];
    assert_eq!(first.properties["name"], "Central");
    assert_eq!(first.properties["lon"], 219529.584);
    assert_eq!(first.properties["lat"], 626907.39);
}

#[test]
fn test_read_layer_reprojects_to_wgs84() {
    let dir = tempfile::tempdir().unwrap();
    let shp_path = write_fixture(dir.path());

    let layer = geo::read_layer(&shp_path, true).unwrap();
    let origin = &layer.records[0];
    let lon = origin.properties["lon"].as_f64().unwrap();
    let lat = origin.properties["lat"].as_f64().unwrap();
    assert!((lon - 35.2045).abs() < 0.01, "lon was {lon}");
    assert!((lat - 31.7344).abs() < 0.01, "lat was {lat}");
}

#[test]
fn test_derived_format_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let shp_path = write_fixture(dir.path());
    let layer = geo::read_layer(&shp_path, false).unwrap();

    let geojson_path = dir.path().join("stations.geojson");
    geo::write_geojson(&layer, &geojson_path).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&geojson_path).unwrap()).unwrap();
    assert_eq!(value["type"], "FeatureCollection");
    assert_eq!(value["features"].as_array().unwrap().len(), 2);
    assert_eq!(value["features"][1]["properties"]["name"], "Harbor");

    let csv_path = dir.path().join("stations.csv");
    geo::write_csv(&layer, &csv_path).unwrap();
    let rendered = std::fs::read_to_string(&csv_path).unwrap();
    assert!(rendered.starts_with("name,riders,lat,lon\n"));
    assert!(rendered.contains("Central,1200.0,626907.39,219529.584"));

    let kml_path = dir.path().join("stations.kml");
    geo::write_kml(&layer, "stations", &kml_path).unwrap();
    let rendered = std::fs::read_to_string(&kml_path).unwrap();
    assert_eq!(rendered.matches("<Placemark>").count(), 2);
    assert!(rendered.contains("<name>Central</name>"));

    let xml_path = dir.path().join("stations.xml");
    geo::write_geoxml(&layer, &xml_path).unwrap();
    let rendered = std::fs::read_to_string(&xml_path).unwrap();
    assert!(rendered.contains("<type>FeatureCollection</type>"));
    assert!(rendered.contains("<name>Harbor</name>"));
}
