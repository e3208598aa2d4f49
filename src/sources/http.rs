//! Plain HTTP fetches: file downloads (streamed to disk) and JSON feeds.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::Result;

/// Stream a URL to a local file, optionally passing the catalog's
/// `Authorization` header for private resources.
pub async fn download(url: &str, auth: Option<&str>, dest: &Path) -> Result<()> {
    info!("downloading {url}");
    let client = reqwest::Client::new();
    let mut request = client.get(url);
    if let Some(key) = auth {
        request = request.header(AUTHORIZATION, key);
    }
    let response = request.send().await?.error_for_status()?;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

pub async fn fetch_json(url: &str) -> Result<Value> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

pub async fn fetch_text(url: &str) -> Result<String> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.text().await?)
}
