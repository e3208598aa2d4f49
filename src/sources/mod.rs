pub mod ftp;
pub mod http;
pub mod remote;
pub mod sharepoint;
