//! Load a SharePoint list feed, materialize it as CSV and upsert it as
//! the named dataset's CSV resource.

use std::path::Path;

use chrono::Local;
use serde_json::Value;
use tracing::info;

use crate::ckan::ResourceUpload;
use crate::config::SharepointConfig;
use crate::convert::tabular;
use crate::error::{EtlError, Result};
use crate::matcher;
use crate::{publisher, sources};

pub async fn run(config: &SharepointConfig) -> Result<()> {
    let feed = sources::http::fetch_text(&config.feed_url).await?;
    let rows = sources::sharepoint::parse_rows(&feed)?;
    info!("loaded {} rows from the list feed", rows.len());

    let table =
        tabular::rows_from_json(&Value::Array(rows.into_iter().map(Value::Object).collect()))?;
    let filename = format!("{}.csv", config.dataset_name);
    tabular::write_csv(&table, Path::new(&filename))?;

    let client = config.ckan.client();
    info!(
        "getting dataset {} from {}",
        config.dataset_name,
        client.base_url()
    );
    let dataset = client.package_show(&config.dataset_name).await?;
    let package_id = dataset
        .id
        .clone()
        .ok_or_else(|| EtlError::Ckan(format!("dataset {} has no id", dataset.name)))?;

    let selected = dataset
        .resources
        .iter()
        .find(|r| r.name.to_uppercase() == "CSV");

    let spec = ResourceUpload {
        package_id: Some(package_id),
        id: selected.and_then(|r| r.id.clone()),
        name: "CSV".to_string(),
        format: "CSV".to_string(),
        created: selected.and_then(|r| r.created.clone()),
        position: selected.and_then(|r| r.position),
        last_modified: Some(matcher::format_timestamp(Local::now().naive_local())),
    };
    publisher::upsert_resource(&client, &spec, Path::new(&filename)).await?;
    Ok(())
}
