//! Fan every active CSV resource of the source portal out to XLSX, JSON
//! and XML siblings in the same dataset. Runs in two passes: first delete
//! duplicate resources left behind by earlier partial runs, then derive
//! the missing or out-of-date siblings.

use std::path::Path;

use tracing::{error, info};

use crate::ckan::{CkanClient, Dataset, Resource, ResourceUpload};
use crate::config::CsvFormatsConfig;
use crate::convert::tabular;
use crate::error::{EtlError, Result};
use crate::matcher;
use crate::{publisher, sources};

const TARGETS: &[(&str, &str)] = &[("XLSX", "xlsx"), ("JSON", "json"), ("XML", "xml")];
const LIST_LIMIT: usize = 1000;

pub async fn run(config: &CsvFormatsConfig) -> Result<()> {
    let client = config.ckan.client();
    dedupe_pass(&client).await?;
    fan_out_pass(&client, &config.ckan.api_key).await?;
    Ok(())
}

/// Delete every resource the matcher flags as a stale duplicate, keeping
/// one canonical resource per name.
async fn dedupe_pass(client: &CkanClient) -> Result<()> {
    info!("getting all dataset ids from {}", client.base_url());
    let datasets = client.current_package_list_with_resources(LIST_LIMIT).await?;
    for listed in datasets {
        info!("dataset id {}", listed.name);
        let dataset = client.package_show(&listed.name).await?;
        let stale = matcher::stale_duplicates(&dataset.resources);
        if stale.is_empty() {
            continue;
        }
        info!(
            "{}: found {} extra resources, will delete",
            dataset.name,
            stale.len()
        );
        for resource in stale {
            let Some(id) = &resource.id else { continue };
            if let Err(e) = client.resource_delete(id).await {
                error!("failed to delete duplicate resource {id}: {e}");
            }
        }
    }
    Ok(())
}

async fn fan_out_pass(client: &CkanClient, api_key: &str) -> Result<()> {
    info!("getting all dataset ids from {}", client.base_url());
    let datasets = client.current_package_list_with_resources(LIST_LIMIT).await?;
    for listed in datasets {
        let dataset = client.package_show(&listed.name).await?;
        let Some(package_id) = dataset.id.clone() else {
            error!("dataset {} has no id, skipping", dataset.name);
            continue;
        };
        let csv_resources: Vec<&Resource> = dataset
            .resources
            .iter()
            .filter(|r| r.format.eq_ignore_ascii_case("CSV") && r.is_active())
            .collect();
        info!("{}: found {} CSV resources", dataset.name, csv_resources.len());
        for source in csv_resources {
            for &(format, suffix) in TARGETS {
                if let Err(e) =
                    derive_resource(client, api_key, &dataset, &package_id, source, format, suffix)
                        .await
                {
                    error!(
                        "failed to derive {format} from {} in {}: {e}",
                        source.name, dataset.name
                    );
                }
            }
        }
    }
    Ok(())
}

async fn derive_resource(
    client: &CkanClient,
    api_key: &str,
    dataset: &Dataset,
    package_id: &str,
    source: &Resource,
    format: &str,
    suffix: &str,
) -> Result<()> {
    let name = matcher::derived_name(&source.name, format);
    info!("new resource name: {name}");

    let existing = matcher::find_existing(&dataset.resources, &name, format);
    if let Some(existing) = existing {
        if matcher::is_current(existing, source) {
            info!("{format} resource already derived from this source, skipping");
            return Ok(());
        }
    }

    let url = source
        .url
        .as_deref()
        .ok_or_else(|| EtlError::Source(format!("resource {} has no URL", source.name)))?;
    info!("processing {url}");

    let workdir = tempfile::tempdir()?;
    let csv_path = workdir.path().join("source.csv");
    sources::http::download(url, Some(api_key), &csv_path).await?;

    let out_path = workdir.path().join(output_filename(url, suffix));
    match format {
        "XLSX" => tabular::csv_to_xlsx(&csv_path, &out_path, &dataset.name)?,
        "JSON" => tabular::csv_to_json(&csv_path, &out_path)?,
        "XML" => tabular::csv_to_xml(&csv_path, &out_path)?,
        other => {
            return Err(EtlError::Convert(format!(
                "no converter for target format {other}"
            )))
        }
    }

    let spec = ResourceUpload {
        package_id: Some(package_id.to_string()),
        id: existing.and_then(|r| r.id.clone()),
        name,
        format: format.to_string(),
        created: existing.and_then(|r| r.created.clone()),
        position: existing.and_then(|r| r.position),
        last_modified: matcher::next_event(source).map(matcher::format_timestamp),
    };
    publisher::upsert_resource(client, &spec, &out_path).await?;
    Ok(())
}

/// Name of the converted file: the source URL's file name with the
/// extension swapped for the target's.
fn output_filename(url: &str, suffix: &str) -> String {
    let name = Path::new(url.rsplit('/').next().unwrap_or("converted"));
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "converted".to_string());
    format!("{stem}.{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filename() {
        assert_eq!(
            output_filename("https://portal/dataset/x/download/data.csv", "xlsx"),
            "data.xlsx"
        );
        assert_eq!(output_filename("https://portal/noext", "json"), "noext.json");
    }
}
