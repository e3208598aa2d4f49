//! End-to-end fan-out scenario over local files: a dataset holding one
//! CSV resource and no XLSX derivative gets exactly one new XLSX resource
//! whose sheet is produced from the CSV rows, and a second run against an
//! unchanged source is a no-op.

use std::fs;

use catalog_etl::ckan::{Resource, ResourceUpload};
use catalog_etl::convert::tabular;
use catalog_etl::matcher;

fn csv_resource() -> Resource {
    Resource {
        id: Some("res-csv-1".to_string()),
        name: "CSV".to_string(),
        format: "CSV".to_string(),
        url: Some("https://portal/dataset/ds1/download/report.csv".to_string()),
        state: Some("active".to_string()),
        created: Some("2023-01-01T08:00:00".to_string()),
        last_modified: Some("2023-04-01T06:30:00".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_fanout_creates_exactly_one_xlsx_resource() {
    let source = csv_resource();
    let resources = vec![source.clone()];

    // Matcher decision: no XLSX derivative exists yet, so this is a create.
    let name = matcher::derived_name(&source.name, "XLSX");
    assert_eq!(name, "XLSX");
    assert!(matcher::find_existing(&resources, &name, "XLSX").is_none());

    // Convert the source rows and build the upload the publisher would send.
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("report.csv");
    fs::write(&csv_path, "station,riders\nCentral,1200\nHarbor,450\n").unwrap();
    let xlsx_path = dir.path().join("report.xlsx");
    tabular::csv_to_xlsx(&csv_path, &xlsx_path, "ds1").unwrap();
    assert!(xlsx_path.metadata().unwrap().len() > 0);

    let upload = ResourceUpload {
        package_id: Some("ds1".to_string()),
        id: None,
        name,
        format: "XLSX".to_string(),
        created: None,
        position: None,
        last_modified: matcher::next_event(&source).map(matcher::format_timestamp),
    };
    assert_eq!(
        upload.last_modified.as_deref(),
        Some("2023-04-01T06:30:01"),
        "derived artifact carries the source's +1s marker"
    );
}

#[test]
fn test_second_run_is_idempotent() {
    let source = csv_resource();

    // What the catalog holds after the first run: the derived resource
    // stamped with the source's +1s marker.
    let derived = Resource {
        id: Some("res-xlsx-1".to_string()),
        name: "XLSX".to_string(),
        format: "XLSX".to_string(),
        created: Some("2023-04-01T06:35:00".to_string()),
        last_modified: matcher::next_event(&source).map(matcher::format_timestamp),
        ..Default::default()
    };
    let resources = vec![source.clone(), derived];

    let name = matcher::derived_name(&source.name, "XLSX");
    let existing = matcher::find_existing(&resources, &name, "XLSX").unwrap();
    assert!(
        matcher::is_current(existing, &source),
        "unchanged source must skip re-conversion"
    );

    // Once the source moves forward, the derivative is stale again.
    let mut touched = source.clone();
    touched.last_modified = Some("2023-05-01T00:00:00".to_string());
    assert!(!matcher::is_current(existing, &touched));
}

#[test]
fn test_dedup_then_match_selects_the_canonical_resource() {
    // Two XLSX leftovers from a crashed run plus the source CSV; the
    // matcher flags the older duplicate and matching resolves to the
    // newer one afterwards.
    let source = csv_resource();
    let old = Resource {
        id: Some("res-xlsx-old".to_string()),
        name: "XLSX".to_string(),
        format: "XLSX".to_string(),
        created: Some("2023-02-01T00:00:00".to_string()),
        last_modified: Some("2023-02-01T00:00:00".to_string()),
        ..Default::default()
    };
    let new = Resource {
        id: Some("res-xlsx-new".to_string()),
        name: "XLSX".to_string(),
        format: "XLSX".to_string(),
        created: Some("2023-03-01T00:00:00".to_string()),
        last_modified: Some("2023-03-01T00:00:00".to_string()),
        ..Default::default()
    };
    let resources = vec![source, old, new];

    let stale = matcher::stale_duplicates(&resources);
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id.as_deref(), Some("res-xlsx-old"));

    let survivors: Vec<Resource> = resources
        .iter()
        .filter(|r| r.id != stale[0].id)
        .cloned()
        .collect();
    let matched = matcher::find_existing(&survivors, "XLSX", "xlsx").unwrap();
    assert_eq!(matched.id.as_deref(), Some("res-xlsx-new"));
}

#[test]
fn test_json_fanout_round_trips_rows() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("report.csv");
    fs::write(&csv_path, "station,riders\nCentral,1200\nHarbor,450\n").unwrap();

    let json_path = dir.path().join("report.json");
    tabular::csv_to_json(&csv_path, &json_path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let table = tabular::rows_from_json(&value).unwrap();
    assert_eq!(table, tabular::read_csv(&csv_path).unwrap());
}
