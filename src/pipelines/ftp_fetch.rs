//! Pull the newest matching file from the FTPS drop directory, normalize
//! it to CSV and upsert it as the dataset's CSV resource, then archive
//! every candidate under `old/` so the next run starts clean.

use std::path::Path;

use chrono::Local;
use tracing::info;

use crate::ckan::ResourceUpload;
use crate::config::FtpConfig;
use crate::convert::tabular;
use crate::error::Result;
use crate::matcher;
use crate::publisher;
use crate::sources::ftp::{normalize_filename, FtpSource};

pub async fn run(config: &FtpConfig) -> Result<()> {
    info!("configuration");
    info!("file pattern: {:?}", config.file_pattern);
    info!("headers row: {}", config.headers_row);
    info!("resource name: {:?}", config.resource_name);

    let mut ftp = FtpSource::connect(&config.host, &config.user, &config.password)?;
    let candidates = ftp.candidates(&config.file_pattern)?;
    info!("found {} candidates", candidates.len());
    if candidates.is_empty() {
        info!("failed to find any candidate, bailing out");
        return Ok(());
    }

    let Some(newest) = candidates.last().cloned() else {
        return Ok(());
    };
    let workdir = tempfile::tempdir()?;
    let local_name = normalize_filename(&newest).unwrap_or_else(|| newest.clone());
    let local_path = workdir.path().join(&local_name);
    ftp.retrieve(&newest, &local_path)?;

    let table = tabular::read_table(&local_path, config.headers_row, &config.delete_fields)?;
    info!(
        "loaded {} rows with columns {:?}",
        table.rows.len(),
        table.headers
    );
    let out_path = Path::new(&config.ckan_filename);
    tabular::write_csv(&table, out_path)?;

    let client = config.ckan.client();
    let dataset = client.package_show(&config.dataset_id).await?;
    info!("new resource name: {}", config.resource_name);
    let existing = dataset
        .resources
        .iter()
        .find(|r| r.format.eq_ignore_ascii_case("CSV") && r.name == config.resource_name);
    if existing.is_some() {
        info!("found existing resource");
    }

    let spec = ResourceUpload {
        package_id: Some(config.dataset_id.clone()),
        id: existing.and_then(|r| r.id.clone()),
        name: config.resource_name.clone(),
        format: "CSV".to_string(),
        created: existing.and_then(|r| r.created.clone()),
        position: existing.and_then(|r| r.position),
        last_modified: Some(matcher::format_timestamp(Local::now().naive_local())),
    };
    publisher::upsert_resource(&client, &spec, out_path).await?;

    ftp.archive(&candidates)?;
    ftp.quit()?;
    Ok(())
}
