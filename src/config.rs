//! Per-job configuration, read from flat environment variables. Every job
//! documents its surface on its config struct; a missing required
//! variable is a fatal startup error.

use std::env;

use crate::ckan::CkanClient;
use crate::error::{EtlError, Result};

pub fn require(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| EtlError::Config(format!("missing required environment variable {name}")))
}

/// Optional variable; the empty string counts as unset.
pub fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// A catalog instance to talk to.
#[derive(Debug, Clone)]
pub struct CkanTarget {
    pub base_url: String,
    pub api_key: String,
}

impl CkanTarget {
    /// `CKAN_HOSTNAME` + `CKAN_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: require("CKAN_HOSTNAME")?,
            api_key: require("CKAN_API_KEY")?,
        })
    }

    pub fn client(&self) -> CkanClient {
        CkanClient::new(&self.base_url, &self.api_key)
    }
}

/// csv-formats: `CKAN_HOSTNAME`, `CKAN_API_KEY`.
#[derive(Debug, Clone)]
pub struct CsvFormatsConfig {
    pub ckan: CkanTarget,
}

impl CsvFormatsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ckan: CkanTarget::from_env()?,
        })
    }
}

/// touch-resources: `CKAN_HOSTNAME`, `CKAN_API_KEY`.
#[derive(Debug, Clone)]
pub struct ToucherConfig {
    pub ckan: CkanTarget,
}

impl ToucherConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ckan: CkanTarget::from_env()?,
        })
    }
}

/// ftp-sync.
///
/// Required: `FTP_HOST`, `FTP_USER`, `FTP_PASSWORD`, `FILE_PATTERN`,
/// `CKAN_FILENAME`, `CKAN_DATASET_ID`, `CKAN_HOSTNAME`, `CKAN_API_KEY`.
/// Optional: `HEADERS_ROW` (default 1), `CKAN_RESOURCE_NAME` (default
/// `CSV`), `DELETE_FIELDS` (comma-separated).
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub file_pattern: String,
    pub headers_row: usize,
    pub ckan_filename: String,
    pub dataset_id: String,
    pub resource_name: String,
    pub delete_fields: Vec<String>,
    pub ckan: CkanTarget,
}

impl FtpConfig {
    pub fn from_env() -> Result<Self> {
        let headers_row = match optional("HEADERS_ROW") {
            Some(raw) => raw
                .parse()
                .map_err(|_| EtlError::Config(format!("HEADERS_ROW is not a number: {raw}")))?,
            None => 1,
        };
        Ok(Self {
            host: require("FTP_HOST")?,
            user: require("FTP_USER")?,
            password: require("FTP_PASSWORD")?,
            file_pattern: require("FILE_PATTERN")?,
            headers_row,
            ckan_filename: require("CKAN_FILENAME")?,
            dataset_id: require("CKAN_DATASET_ID")?,
            resource_name: optional("CKAN_RESOURCE_NAME").unwrap_or_else(|| "CSV".to_string()),
            delete_fields: optional("DELETE_FIELDS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            ckan: CkanTarget::from_env()?,
        })
    }
}

/// sharepoint-sync: `URL`, `DATASET_NAME`, `CKAN_HOSTNAME`, `CKAN_API_KEY`.
#[derive(Debug, Clone)]
pub struct SharepointConfig {
    pub feed_url: String,
    pub dataset_name: String,
    pub ckan: CkanTarget,
}

impl SharepointConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            feed_url: require("URL")?,
            dataset_name: require("DATASET_NAME")?,
            ckan: CkanTarget::from_env()?,
        })
    }
}

/// mirror-upload.
///
/// Mirror credentials: `CREDS_FILENAME`, `CLIENT_ID`,
/// `DATAGOV_CKAN_API_KEY`. Local side: `DATASET_ID`, `CKAN_HOSTNAME`,
/// `CKAN_API_KEY`. `DATAGOV_RESOURCES` is a newline-separated list of
/// `<local resource name>:<mirror resource id>` pairs. Optional:
/// `MIRROR_CKAN_URL` overrides the mirror endpoint.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub creds_filename: String,
    pub client_id: String,
    pub mirror_api_key: String,
    pub mirror_url: String,
    pub dataset_id: String,
    pub resource_map: Vec<(String, String)>,
    pub ckan: CkanTarget,
}

const DEFAULT_MIRROR_URL: &str = "https://e.data.gov.il";

impl MirrorConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            creds_filename: require("CREDS_FILENAME")?,
            client_id: require("CLIENT_ID")?,
            mirror_api_key: require("DATAGOV_CKAN_API_KEY")?,
            mirror_url: optional("MIRROR_CKAN_URL")
                .unwrap_or_else(|| DEFAULT_MIRROR_URL.to_string()),
            dataset_id: require("DATASET_ID")?,
            resource_map: Self::parse_resource_map(&require("DATAGOV_RESOURCES")?)?,
            ckan: CkanTarget::from_env()?,
        })
    }

    fn parse_resource_map(raw: &str) -> Result<Vec<(String, String)>> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.split_once(':')
                    .map(|(name, id)| (name.to_string(), id.to_string()))
                    .ok_or_else(|| {
                        EtlError::Config(format!(
                            "DATAGOV_RESOURCES entry is not name:id -- {line}"
                        ))
                    })
            })
            .collect()
    }
}

/// api-fetch.
///
/// Required: `SOURCE_URL`, `DATASET_NAME`, `DATASET_TITLE`,
/// `DATASET_ORG_ID`, `CKAN_HOSTNAME`, `CKAN_API_KEY`. Optional:
/// `SKIP_IDS`, `STRING_FIELDS`, `EPOCH_DATE_FIELDS` (comma-separated;
/// the date fields default to `createdAt,updatedAt`).
#[derive(Debug, Clone)]
pub struct ApiFetchConfig {
    pub source_url: String,
    pub dataset_name: String,
    pub dataset_title: String,
    pub org_id: String,
    pub skip_ids: Vec<String>,
    pub string_fields: Vec<String>,
    pub epoch_date_fields: Vec<String>,
    pub ckan: CkanTarget,
}

impl ApiFetchConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            source_url: require("SOURCE_URL")?,
            dataset_name: require("DATASET_NAME")?,
            dataset_title: require("DATASET_TITLE")?,
            org_id: require("DATASET_ORG_ID")?,
            skip_ids: optional("SKIP_IDS").map(|v| split_list(&v)).unwrap_or_default(),
            string_fields: optional("STRING_FIELDS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            epoch_date_fields: optional("EPOCH_DATE_FIELDS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|| vec!["createdAt".to_string(), "updatedAt".to_string()]),
            ckan: CkanTarget::from_env()?,
        })
    }
}

/// gis-sync.
///
/// SSH side: `SSH_HOST`, `SSH_USER`, `SSH_PASSWORD`, `REMOTE_PYTHON`
/// (e.g. `c:\python27\ArcGISx6410.9\python.exe`), `OUTPUT_LOCATION`
/// (e.g. `//gis-server/e$/directory`), `SDE_PATH`, `LAYER_NAME`.
/// Optional layer shaping: `DELETE_FIELDS`, `RENAME_FIELDS`
/// (`to:from;to:from`), `SELECT_EXPRESSION`.
/// Dataset metadata: `DATASET_NAME`, `DATASET_TITLE`,
/// `DATASET_DESCRIPTION`, `DATASET_ORG_ID`, `DATASET_CATEGORY`,
/// `DATASET_UPDATE_PERIOD`, `DATASET_PRIVATE` (`true`/`false`),
/// optional `RESOURCE_NAME_PREFIX`.
/// Destinations, both optional: catalog (`CKAN_HOSTNAME` +
/// `CKAN_API_KEY`), blob store (`BLOBSTORE_CONNECTION_STRING` +
/// `BLOBSTORE_CONTAINER`).
#[derive(Debug, Clone)]
pub struct GisConfig {
    pub ssh_host: String,
    pub ssh_user: String,
    pub ssh_password: String,
    pub remote_python: String,
    pub output_location: String,
    pub sde_path: String,
    pub layer_name: String,
    pub delete_fields: String,
    pub rename_fields: String,
    pub select_expression: String,
    pub dataset_name: String,
    pub dataset_title: String,
    pub dataset_description: String,
    pub org_id: String,
    pub category: String,
    pub update_period: String,
    pub private: bool,
    pub resource_prefix: Option<String>,
    pub ckan: Option<CkanTarget>,
    pub blob: Option<BlobTarget>,
}

#[derive(Debug, Clone)]
pub struct BlobTarget {
    pub connection_string: String,
    pub container: String,
}

impl GisConfig {
    pub fn from_env() -> Result<Self> {
        let ckan = match optional("CKAN_HOSTNAME") {
            Some(base_url) => Some(CkanTarget {
                base_url,
                api_key: require("CKAN_API_KEY")?,
            }),
            None => None,
        };
        let blob = match optional("BLOBSTORE_CONNECTION_STRING") {
            Some(connection_string) => Some(BlobTarget {
                connection_string,
                container: require("BLOBSTORE_CONTAINER")?,
            }),
            None => None,
        };
        Ok(Self {
            ssh_host: require("SSH_HOST")?,
            ssh_user: require("SSH_USER")?,
            ssh_password: require("SSH_PASSWORD")?,
            remote_python: require("REMOTE_PYTHON")?,
            output_location: require("OUTPUT_LOCATION")?,
            sde_path: require("SDE_PATH")?,
            layer_name: require("LAYER_NAME")?,
            delete_fields: optional("DELETE_FIELDS").unwrap_or_default(),
            rename_fields: optional("RENAME_FIELDS").unwrap_or_default(),
            select_expression: optional("SELECT_EXPRESSION").unwrap_or_default(),
            dataset_name: require("DATASET_NAME")?,
            dataset_title: require("DATASET_TITLE")?,
            dataset_description: require("DATASET_DESCRIPTION")?,
            org_id: require("DATASET_ORG_ID")?,
            category: require("DATASET_CATEGORY")?,
            update_period: require("DATASET_UPDATE_PERIOD")?,
            private: require("DATASET_PRIVATE")? == "true",
            resource_prefix: optional("RESOURCE_NAME_PREFIX"),
            ckan,
            blob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_reports_the_variable_name() {
        let err = require("CATALOG_ETL_TEST_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("CATALOG_ETL_TEST_UNSET_VAR"));
    }

    #[test]
    fn test_optional_treats_empty_as_unset() {
        env::set_var("CATALOG_ETL_TEST_EMPTY_VAR", "");
        assert_eq!(optional("CATALOG_ETL_TEST_EMPTY_VAR"), None);
        env::remove_var("CATALOG_ETL_TEST_EMPTY_VAR");
    }

    #[test]
    fn test_parse_resource_map() {
        let map =
            MirrorConfig::parse_resource_map("CSV:abc-123\nXLSX Export:def-456\n\n").unwrap();
        assert_eq!(
            map,
            vec![
                ("CSV".to_string(), "abc-123".to_string()),
                ("XLSX Export".to_string(), "def-456".to_string()),
            ]
        );
        assert!(MirrorConfig::parse_resource_map("no-separator").is_err());
    }
}
