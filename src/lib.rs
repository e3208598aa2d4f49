//! ETL jobs for moving tabular and geospatial data between a CKAN-compatible
//! open-data catalog and its surrounding systems: an ArcGIS/SDE geodatabase
//! reached over SSH, an FTPS server, a SharePoint list endpoint and an Azure
//! blob container.
//!
//! Each job is an independent binary (see `src/bin/`) configured entirely
//! through environment variables; this library holds the shared pieces:
//! the catalog client, the resource matcher, the format converters and the
//! source readers.

pub mod auth;
pub mod blob;
pub mod ckan;
pub mod config;
pub mod convert;
pub mod error;
pub mod matcher;
pub mod pipelines;
pub mod publisher;
pub mod sources;

pub use ckan::CkanClient;
pub use error::{EtlError, Result};
