//! FTPS source: find the newest file matching a name pattern, pull it,
//! and archive processed candidates under `old/`.

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use suppaftp::native_tls::TlsConnector;
use suppaftp::{NativeTlsConnector, NativeTlsFtpStream};
use tracing::{info, warn};

use crate::error::{EtlError, Result};

fn ftp_err(e: suppaftp::FtpError) -> EtlError {
    EtlError::Ftp(e.to_string())
}

/// Server directory listings arrive latin-1-mangled: every char holds one
/// byte of the original UTF-8 name. Re-decode, or None when the name is
/// not recoverable.
pub fn normalize_filename(name: &str) -> Option<String> {
    let bytes: Option<Vec<u8>> = name
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect();
    String::from_utf8(bytes?).ok()
}

pub struct FtpSource {
    stream: NativeTlsFtpStream,
}

impl FtpSource {
    pub fn connect(host: &str, user: &str, password: &str) -> Result<Self> {
        let plain = NativeTlsFtpStream::connect(format!("{host}:21")).map_err(ftp_err)?;
        let connector = TlsConnector::new().map_err(|e| EtlError::Ftp(e.to_string()))?;
        let mut stream = plain
            .into_secure(NativeTlsConnector::from(connector), host)
            .map_err(ftp_err)?;
        stream.login(user, password).map_err(ftp_err)?;
        info!("connected to {host}");
        Ok(Self { stream })
    }

    /// Files in the root directory whose (normalized) name contains
    /// `pattern`, oldest first by server modification time. Entries
    /// without a modification time (directories) are skipped.
    pub fn candidates(&mut self, pattern: &str) -> Result<Vec<String>> {
        let names = self.stream.nlst(None).map_err(ftp_err)?;
        let mut matched: Vec<(NaiveDateTime, String)> = Vec::new();
        for name in names {
            let Some(normalized) = normalize_filename(&name) else {
                warn!("failed to normalize file name {name:?}");
                continue;
            };
            if !normalized.contains(pattern) {
                continue;
            }
            match self.stream.mdtm(&name) {
                Ok(modified) => matched.push((modified, name)),
                Err(_) => continue,
            }
        }
        matched.sort();
        Ok(matched.into_iter().map(|(_, name)| name).collect())
    }

    pub fn retrieve(&mut self, name: &str, dest: &Path) -> Result<()> {
        info!("retrieving {name}");
        let buffer = self.stream.retr_as_buffer(name).map_err(ftp_err)?;
        std::fs::write(dest, buffer.into_inner())?;
        Ok(())
    }

    /// Move every candidate out of the way so the next run does not
    /// process it again: `old/<name>-<YYYYMMDD>`.
    pub fn archive(&mut self, names: &[String]) -> Result<()> {
        let suffix = Local::now().format("%Y%m%d").to_string();
        for name in names {
            info!("moving {name} to old/");
            self.stream
                .rename(name, &format!("old/{name}-{suffix}"))
                .map_err(ftp_err)?;
        }
        Ok(())
    }

    pub fn quit(mut self) -> Result<()> {
        self.stream.quit().map_err(ftp_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_filename_recovers_utf8() {
        // "דוח.csv" seen as one char per UTF-8 byte.
        let mangled: String = "דוח.csv"
            .bytes()
            .map(|b| char::from_u32(u32::from(b)).unwrap())
            .collect();
        assert_eq!(normalize_filename(&mangled).as_deref(), Some("דוח.csv"));
    }

    #[test]
    fn test_normalize_filename_passes_ascii_through() {
        assert_eq!(normalize_filename("report.csv").as_deref(), Some("report.csv"));
    }

    #[test]
    fn test_normalize_filename_rejects_wide_chars() {
        // A char above U+00FF cannot be a single byte of the original name.
        assert_eq!(normalize_filename("report\u{5000}.csv"), None);
    }
}
