//! Export an SDE layer through the GIS host, convert it to every derived
//! format in both WGS84 and native-grid variants, and publish the lot:
//! dataset + resources on the catalog, plus the projected GeoJSON to the
//! blob container when one is configured.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{error, info};

use crate::ckan::{Dataset, ResourceUpload};
use crate::config::{CkanTarget, GisConfig};
use crate::convert::geo;
use crate::error::{EtlError, Result};
use crate::sources::remote::{self, RemoteHost};
use crate::{blob, publisher};

/// Shapefile components fetched from the GIS host; the Esri metadata XML
/// is only read for its lineage dates and stays out of the archive.
const COMPONENTS: [&str; 5] = ["shp", "dbf", "shx", "prj", "shp.xml"];

pub async fn run(config: &GisConfig) -> Result<()> {
    let remote = RemoteHost::connect(&config.ssh_host, &config.ssh_user, &config.ssh_password)?;
    remote.upload_script()?;
    let args = vec![
        config.sde_path.clone(),
        config.layer_name.clone(),
        remote::hex_arg(&config.delete_fields),
        remote::hex_arg(&config.rename_fields),
        remote::hex_arg(&config.select_expression),
        remote::hex_arg(&config.output_location),
    ];
    remote.run_export(&config.remote_python, &args)?;

    let workdir = tempfile::tempdir()?;
    for ext in COMPONENTS {
        let remote_path = format!("{}/{}.{}", config.output_location, config.layer_name, ext);
        let local = workdir.path().join(format!("{}.{}", config.layer_name, ext));
        remote.fetch_file(&remote_path, &local)?;
    }

    let file_stem = match &config.resource_prefix {
        Some(prefix) => format!("{} - {}", config.dataset_name, prefix),
        None => config.dataset_name.clone(),
    };
    let zip_path = workdir.path().join(format!("{file_stem}.zip"));
    build_archive(workdir.path(), &config.layer_name, &file_stem, &zip_path)?;

    let shp_path = workdir.path().join(format!("{}.shp", config.layer_name));
    let projected = geo::read_layer(&shp_path, true)?;
    let native = geo::read_layer(&shp_path, false)?;
    info!(
        "parsed layer {}: {} records",
        config.layer_name,
        projected.records.len()
    );

    let mut uploads: Vec<(String, PathBuf)> = vec![("SHP".to_string(), zip_path)];
    uploads.extend(convert_variant(
        &projected,
        &config.layer_name,
        workdir.path(),
        &file_stem,
        "",
    )?);
    uploads.extend(convert_variant(
        &native,
        &config.layer_name,
        workdir.path(),
        &file_stem,
        "-ITM",
    )?);

    let geojson_path = workdir.path().join(format!("{file_stem}.geojson"));

    if let Some(target) = &config.ckan {
        publish(config, target, &uploads, workdir.path()).await?;
    }

    if let Some(blob_target) = &config.blob {
        blob::upload_overwrite(
            &blob_target.connection_string,
            &blob_target.container,
            &format!("{file_stem}.geojson"),
            &geojson_path,
        )
        .await?;
    }

    Ok(())
}

/// One projection variant of the layer rendered to all four derived
/// formats. `suffix` tags the native-grid variant's format names; its
/// files get an extra `.itm` in the name.
fn convert_variant(
    layer: &geo::Layer,
    layer_name: &str,
    workdir: &Path,
    file_stem: &str,
    suffix: &str,
) -> Result<Vec<(String, PathBuf)>> {
    let infix = if suffix.is_empty() { "" } else { ".itm" };
    let path = |ext: &str| workdir.join(format!("{file_stem}{infix}.{ext}"));

    let geojson = path("geojson");
    geo::write_geojson(layer, &geojson)?;
    let csv = path("csv");
    geo::write_csv(layer, &csv)?;
    let xml = path("xml");
    geo::write_geoxml(layer, &xml)?;
    let kml = path("kml");
    geo::write_kml(layer, layer_name, &kml)?;

    Ok(vec![
        (format!("GeoJSON{suffix}"), geojson),
        (format!("CSV{suffix}"), csv),
        (format!("GeoXML{suffix}"), xml),
        (format!("KML{suffix}"), kml),
    ])
}

/// Zip the shapefile components under the dataset's file stem so the
/// archive extracts with catalog-facing names.
fn build_archive(
    workdir: &Path,
    layer_name: &str,
    file_stem: &str,
    zip_path: &Path,
) -> Result<()> {
    let file = File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for ext in &COMPONENTS[..4] {
        writer.start_file(format!("{file_stem}.{ext}"), options)?;
        let data = std::fs::read(workdir.join(format!("{layer_name}.{ext}")))?;
        writer.write_all(&data)?;
    }
    writer.finish()?;
    Ok(())
}

async fn publish(
    config: &GisConfig,
    target: &CkanTarget,
    uploads: &[(String, PathBuf)],
    workdir: &Path,
) -> Result<()> {
    let client = target.client();
    info!("creating dataset...");
    let spec = Dataset {
        name: config.dataset_name.clone(),
        title: Some(config.dataset_title.clone()),
        notes: Some(config.dataset_description.clone()),
        owner_org: Some(config.org_id.clone()),
        category: Some(config.category.clone()),
        update_period: Some(config.update_period.clone()),
        private: Some(config.private),
        ..Default::default()
    };
    let dataset = publisher::upsert_dataset(&client, &spec).await?;
    let package_id = dataset
        .id
        .clone()
        .ok_or_else(|| EtlError::Ckan(format!("dataset {} has no id", dataset.name)))?;

    let metadata_xml =
        std::fs::read_to_string(workdir.join(format!("{}.shp.xml", config.layer_name)))?;
    let last_modified =
        lineage_last_modified(&metadata_xml, dataset.metadata_created.as_deref());
    info!("derived modification date: {last_modified:?}");

    for (format_tag, path) in uploads {
        let upload_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let resource_name = match &config.resource_prefix {
            Some(prefix) => format!("{prefix} - {format_tag}"),
            None => format_tag.clone(),
        };
        info!("considering upload: fmt {format_tag}, fn {upload_filename}, name {resource_name}");

        let existing = dataset.resources.iter().find(|r| {
            r.url_filename() == Some(upload_filename.as_str()) && r.name == resource_name
        });
        let spec = match existing {
            Some(resource) => ResourceUpload {
                package_id: Some(package_id.clone()),
                id: resource.id.clone(),
                name: resource_name,
                // The update keeps the base format tag; the projection
                // marker only lives in the resource name.
                format: format_tag
                    .split('-')
                    .next()
                    .unwrap_or(format_tag)
                    .to_string(),
                created: resource.created.clone(),
                position: resource.position,
                last_modified: last_modified.clone(),
            },
            None => ResourceUpload {
                package_id: Some(package_id.clone()),
                id: None,
                name: resource_name,
                format: format_tag.clone(),
                created: None,
                position: None,
                last_modified: None,
            },
        };
        if let Err(e) = publisher::upsert_resource(&client, &spec, path).await {
            error!("failed to publish {format_tag}: {e}");
        }
    }
    Ok(())
}

/// Derive the layer's modification date from the Esri lineage: the
/// second-newest distinct `Process` date (the newest is the export this
/// run just performed), pinned to noon. Falls back to the dataset's
/// creation date when there is no history.
pub fn lineage_last_modified(metadata_xml: &str, fallback: Option<&str>) -> Option<String> {
    use quick_xml::events::Event;

    let date_format = Regex::new(r"^\d{8}$").unwrap();
    let mut reader = quick_xml::Reader::from_str(metadata_xml);
    let mut dates: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"Process" {
                    continue;
                }
                for attribute in e.attributes().flatten() {
                    if attribute.key.as_ref() != b"Date" {
                        continue;
                    }
                    let value = String::from_utf8_lossy(&attribute.value).into_owned();
                    if date_format.is_match(&value) && !dates.contains(&value) {
                        dates.push(value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    dates.sort();
    info!("modification dates: {dates:?}");
    if dates.len() > 1 {
        let date = &dates[dates.len() - 2];
        Some(format!(
            "{}-{}-{}T12:00:00",
            &date[..4],
            &date[4..6],
            &date[6..8]
        ))
    } else {
        fallback.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"<?xml version="1.0"?>
        <metadata><Esri><DataProperties><lineage>
            <Process Date="20230110" Time="120000">export</Process>
            <Process Date="20230512" Time="080000">fields</Process>
            <Process Date="20230512" Time="090000">again</Process>
            <Process Date="20240101" Time="060000">latest</Process>
        </lineage></DataProperties></Esri></metadata>"#;

    #[test]
    fn test_lineage_picks_second_newest_date() {
        let derived = lineage_last_modified(METADATA, Some("2020-01-01T00:00:00"));
        assert_eq!(derived.as_deref(), Some("2023-05-12T12:00:00"));
    }

    #[test]
    fn test_lineage_falls_back_to_dataset_creation() {
        let single = r#"<lineage><Process Date="20230110"/></lineage>"#;
        assert_eq!(
            lineage_last_modified(single, Some("2020-01-01T00:00:00")).as_deref(),
            Some("2020-01-01T00:00:00")
        );
        assert_eq!(lineage_last_modified("<x/>", None), None);
    }
}
