//! One orchestration module per job; the binaries under `src/bin/` are
//! thin wrappers around these.

pub mod api_fetch;
pub mod csv_formats;
pub mod ftp_fetch;
pub mod gis;
pub mod mirror;
pub mod sharepoint;
pub mod toucher;
