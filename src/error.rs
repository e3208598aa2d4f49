use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Ckan(String),

    #[error("Conversion error: {0}")]
    Convert(String),

    #[error("FTP error: {0}")]
    Ftp(String),

    #[error("Remote execution error: {0}")]
    Remote(String),

    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;
