//! Mirror selected resources of a local dataset to the national portal:
//! download each mapped resource's file and push it to the pre-assigned
//! resource id on the mirror instance, carrying the local timestamps.

use std::collections::HashMap;
use std::path::Path;

use tracing::{error, info};

use crate::auth;
use crate::ckan::ResourceUpload;
use crate::config::MirrorConfig;
use crate::error::Result;
use crate::sources;

pub async fn run(config: &MirrorConfig) -> Result<()> {
    info!("getting mirror session...");
    let mirror = auth::mirror_client(
        &config.mirror_url,
        Path::new(&config.creds_filename),
        &config.client_id,
        &config.mirror_api_key,
    )
    .await?;
    info!("done");

    let mapping: HashMap<&str, &str> = config
        .resource_map
        .iter()
        .map(|(name, id)| (name.as_str(), id.as_str()))
        .collect();

    let local = config.ckan.client();
    let dataset = local.package_show(&config.dataset_id).await?;

    for resource in &dataset.resources {
        info!("considering: {} ({})", resource.name, resource.format);
        let Some(remote_id) = mapping.get(resource.name.as_str()) else {
            continue;
        };
        info!("uploading to mirror: {}", resource.name);
        let Some(url) = resource.url.as_deref() else {
            error!("resource {} has no URL, skipping", resource.name);
            continue;
        };
        let filename = resource
            .url_filename()
            .unwrap_or("resource.bin")
            .to_string();

        let spec = ResourceUpload {
            package_id: None,
            id: Some(remote_id.to_string()),
            name: resource.name.clone(),
            format: resource.format.clone(),
            created: resource.created.clone(),
            position: None,
            last_modified: resource.last_modified.clone(),
        };

        let workdir = tempfile::tempdir()?;
        let local_path = workdir.path().join(&filename);
        info!("getting data from: {url}");
        if let Err(e) = sources::http::download(url, Some(&config.ckan.api_key), &local_path).await
        {
            error!("failed to download {url}: {e}");
            continue;
        }
        match mirror.resource_update_upload(&spec, &local_path).await {
            Ok(_) => info!("updated mirror resource {remote_id} with {filename}"),
            Err(e) => error!("failed to update mirror resource {remote_id}: {e}"),
        }
    }
    Ok(())
}
