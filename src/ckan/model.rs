use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A file or link attached to a dataset in the catalog.
///
/// Only the fields the pipelines act on are typed; everything else the
/// catalog returns is kept in `extra` so update calls round-trip it
/// unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    pub fn is_active(&self) -> bool {
        self.state.as_deref() == Some("active")
    }

    /// Last path segment of the resource URL, the way the catalog names
    /// uploaded files.
    pub fn url_filename(&self) -> Option<&str> {
        self.url.as_deref().and_then(|u| u.rsplit('/').next())
    }
}

/// A dataset (package) with its ordered resource list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_created: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fields sent alongside a file payload on `resource_create` /
/// `resource_update`. On update, `created` and `position` are carried over
/// unchanged so the catalog keeps the display order.
#[derive(Debug, Clone, Default)]
pub struct ResourceUpload {
    pub package_id: Option<String>,
    pub id: Option<String>,
    pub name: String,
    pub format: String,
    pub created: Option<String>,
    pub position: Option<i64>,
    pub last_modified: Option<String>,
}
