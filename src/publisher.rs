//! Create/update calls against the catalog, built so re-running a job is
//! idempotent: updates carry `created` and `position` over unchanged and
//! the same (name, format) always resolves to the same resource.

use std::path::Path;

use tracing::{error, info};

use crate::ckan::{CkanClient, Dataset, Resource, ResourceUpload};
use crate::error::{EtlError, Result};
use crate::matcher;

/// Create the resource, or update it in place when the spec carries an
/// existing id.
pub async fn upsert_resource(
    client: &CkanClient,
    spec: &ResourceUpload,
    file: &Path,
) -> Result<Resource> {
    if spec.id.is_some() {
        let updated = client.resource_update_upload(spec, file).await?;
        info!("resource updated: {} ({})", spec.name, spec.format);
        Ok(updated)
    } else {
        let created = client.resource_create_upload(spec, file).await?;
        info!("resource created: {} ({})", spec.name, spec.format);
        Ok(created)
    }
}

/// `package_create`, falling back to show-merge-update when the dataset
/// already exists. The fallback only overrides identity fields (name,
/// owning organization, privacy); title, notes, category and update period
/// stay whatever the catalog operators last set them to.
pub async fn upsert_dataset(client: &CkanClient, dataset: &Dataset) -> Result<Dataset> {
    match client.package_create(dataset).await {
        Ok(created) => {
            info!("dataset created: {}", created.name);
            Ok(created)
        }
        Err(EtlError::Ckan(detail)) => {
            info!("dataset {} already exists, updating ({detail})", dataset.name);
            let mut current = client.package_show(&dataset.name).await?;
            current.name = dataset.name.clone();
            current.owner_org = dataset.owner_org.clone();
            current.private = dataset.private;
            let updated = client.package_update(&current).await?;
            info!("dataset updated: {}", updated.name);
            Ok(updated)
        }
        Err(other) => Err(other),
    }
}

/// Publish a whole dataset: make sure the organization exists, upsert the
/// dataset, then upsert every (name, format, file) triple against its
/// current resource list. Per-resource failures are logged and skipped;
/// dataset-level failures abort.
pub async fn publish_dataset(
    client: &CkanClient,
    organization: &str,
    dataset: &Dataset,
    files: &[(String, String, std::path::PathBuf)],
) -> Result<()> {
    if let Err(e) = client.organization_create(organization).await {
        info!("organization {organization} not created (assuming it exists): {e}");
    }

    let published = upsert_dataset(client, dataset).await?;
    let package_id = published
        .id
        .clone()
        .ok_or_else(|| EtlError::Ckan(format!("dataset {} has no id", published.name)))?;

    for (name, format, path) in files {
        let existing = matcher::find_existing(&published.resources, name, format);
        let spec = ResourceUpload {
            package_id: Some(package_id.clone()),
            id: existing.and_then(|r| r.id.clone()),
            name: name.clone(),
            format: format.clone(),
            created: existing.and_then(|r| r.created.clone()),
            position: existing.and_then(|r| r.position),
            last_modified: None,
        };
        if let Err(e) = upsert_resource(client, &spec, path).await {
            error!("failed to publish resource {name} ({format}): {e}");
        }
    }
    Ok(())
}
