//! Azure blob destination: one named blob, overwritten on every run.

use std::path::Path;

use azure_storage::ConnectionString;
use azure_storage_blobs::prelude::*;
use tracing::info;

use crate::error::{EtlError, Result};

/// Upload `path` as `blob_name` into `container`, replacing any previous
/// version of the blob.
pub async fn upload_overwrite(
    connection_string: &str,
    container: &str,
    blob_name: &str,
    path: &Path,
) -> Result<()> {
    let parsed = ConnectionString::new(connection_string)
        .map_err(|e| EtlError::Blob(format!("bad connection string: {e}")))?;
    let account = parsed
        .account_name
        .ok_or_else(|| EtlError::Blob("connection string has no account name".to_string()))?;
    let credentials = parsed
        .storage_credentials()
        .map_err(|e| EtlError::Blob(format!("bad storage credentials: {e}")))?;

    let client = BlobServiceClient::new(account, credentials)
        .container_client(container)
        .blob_client(blob_name);

    let payload = tokio::fs::read(path).await?;
    client
        .put_block_blob(payload)
        .content_type("application/json")
        .await
        .map_err(|e| EtlError::Blob(format!("upload failed: {e}")))?;

    info!("uploaded {blob_name} to container {container}");
    Ok(())
}
