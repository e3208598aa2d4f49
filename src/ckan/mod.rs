//! Client for the catalog's action API.
//!
//! All calls go through the JSON envelope `{success, result, error}`; a
//! response with `success: false` surfaces as [`EtlError::Ckan`]. File
//! payloads are sent as multipart forms with the file under the `upload`
//! part, everything else as JSON bodies.

pub mod model;

use std::path::Path;

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EtlError, Result};
pub use model::{Dataset, Resource, ResourceUpload};

#[derive(Debug, Deserialize)]
struct ActionResponse<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    error: Option<Value>,
}

pub struct CkanClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl CkanClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self::with_http(base_url, api_key, reqwest::Client::new())
    }

    /// Build a client over a pre-configured HTTP client, e.g. one carrying
    /// the extra session headers the mirror instance requires.
    pub fn with_http(base_url: &str, api_key: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/api/3/action/{}", self.base_url, action)
    }

    fn unwrap_envelope<T>(action: &str, body: ActionResponse<T>) -> Result<T> {
        if !body.success {
            let detail = body
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(EtlError::Ckan(format!("{action} failed: {detail}")));
        }
        body.result
            .ok_or_else(|| EtlError::Ckan(format!("{action} returned an empty result")))
    }

    async fn action_get<T: DeserializeOwned>(
        &self,
        action: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!("GET {action} {query:?}");
        let response = self
            .http
            .get(self.action_url(action))
            .header(AUTHORIZATION, &self.api_key)
            .query(query)
            .send()
            .await?;
        Self::unwrap_envelope(action, response.json().await?)
    }

    async fn action_post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        action: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {action}");
        let response = self
            .http
            .post(self.action_url(action))
            .header(AUTHORIZATION, &self.api_key)
            .json(body)
            .send()
            .await?;
        Self::unwrap_envelope(action, response.json().await?)
    }

    /// POST whose result payload is irrelevant (e.g. `resource_delete`
    /// returns `null`); only the envelope's success flag is checked.
    async fn action_post_ok<B: Serialize + ?Sized>(&self, action: &str, body: &B) -> Result<()> {
        let response = self
            .http
            .post(self.action_url(action))
            .header(AUTHORIZATION, &self.api_key)
            .json(body)
            .send()
            .await?;
        let envelope: ActionResponse<Value> = response.json().await?;
        if !envelope.success {
            let detail = envelope
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(EtlError::Ckan(format!("{action} failed: {detail}")));
        }
        Ok(())
    }

    pub async fn package_show(&self, id: &str) -> Result<Dataset> {
        // Cache-busting token so a proxy in front of the catalog cannot
        // serve a stale dataset between the dedup and fan-out passes.
        let bust = Uuid::new_v4().to_string();
        self.action_get("package_show", &[("id", id), ("cachebusting", bust.as_str())])
            .await
    }

    pub async fn package_list(&self) -> Result<Vec<String>> {
        self.action_get("package_list", &[]).await
    }

    pub async fn current_package_list_with_resources(&self, limit: usize) -> Result<Vec<Dataset>> {
        let limit = limit.to_string();
        self.action_get(
            "current_package_list_with_resources",
            &[("limit", limit.as_str())],
        )
        .await
    }

    pub async fn package_create(&self, dataset: &Dataset) -> Result<Dataset> {
        self.action_post("package_create", dataset).await
    }

    pub async fn package_update(&self, dataset: &Dataset) -> Result<Dataset> {
        self.action_post("package_update", dataset).await
    }

    pub async fn organization_create(&self, name: &str) -> Result<Value> {
        self.action_post("organization_create", &serde_json::json!({ "name": name }))
            .await
    }

    pub async fn resource_delete(&self, id: &str) -> Result<()> {
        self.action_post_ok("resource_delete", &serde_json::json!({ "id": id }))
            .await
    }

    /// Metadata-only resource update; the file payload stays whatever the
    /// catalog already holds.
    pub async fn resource_update(&self, resource: &Resource) -> Result<Resource> {
        self.action_post("resource_update", resource).await
    }

    pub async fn resource_create_upload(
        &self,
        spec: &ResourceUpload,
        file: &Path,
    ) -> Result<Resource> {
        self.action_upload("resource_create", spec, file).await
    }

    pub async fn resource_update_upload(
        &self,
        spec: &ResourceUpload,
        file: &Path,
    ) -> Result<Resource> {
        self.action_upload("resource_update", spec, file).await
    }

    async fn action_upload(
        &self,
        action: &str,
        spec: &ResourceUpload,
        file: &Path,
    ) -> Result<Resource> {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| spec.name.clone());
        let payload = tokio::fs::read(file).await?;

        let mut form = Form::new()
            .text("name", spec.name.clone())
            .text("format", spec.format.clone());
        if let Some(package_id) = &spec.package_id {
            form = form.text("package_id", package_id.clone());
        }
        if let Some(id) = &spec.id {
            form = form.text("id", id.clone());
        }
        if let Some(created) = &spec.created {
            form = form.text("created", created.clone());
        }
        if let Some(position) = spec.position {
            form = form.text("position", position.to_string());
        }
        if let Some(last_modified) = &spec.last_modified {
            form = form.text("last_modified", last_modified.clone());
        }
        form = form.part("upload", Part::bytes(payload).file_name(filename));

        debug!("POST {action} (upload: {})", file.display());
        let response = self
            .http
            .post(self.action_url(action))
            .header(AUTHORIZATION, &self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::unwrap_envelope(action, response.json().await?)
    }
}
