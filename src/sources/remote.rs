//! Remote geodatabase export over SSH: ship the geoprocessing script to
//! the GIS host, run it through the ArcGIS python interpreter with
//! hex-encoded positional arguments, then pull the resulting shapefile
//! components back.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

use itertools::Itertools;
use ssh2::Session;
use tracing::info;

use crate::error::{EtlError, Result};

/// The arcpy export script executed on the GIS host.
pub const REMOTE_SCRIPT: &str = include_str!("../../assets/remote_convert.py");

/// Where the script lands on the remote filesystem (SFTP path and the
/// Windows path the interpreter sees).
const REMOTE_SCRIPT_PATH: &str = "/scripts/remote.py";
const REMOTE_SCRIPT_WINDOWS_PATH: &str = "c:\\scripts\\remote.py";

/// Arguments cross the remote shell hex-encoded so field lists, SQL
/// expressions and UNC paths survive Windows quoting.
pub fn hex_arg(value: &str) -> String {
    hex::encode(value.as_bytes())
}

pub struct RemoteHost {
    session: Session,
}

impl RemoteHost {
    pub fn connect(host: &str, user: &str, password: &str) -> Result<Self> {
        let tcp = TcpStream::connect((host, 22))?;
        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        session.userauth_password(user, password)?;
        info!("connected to {host}");
        Ok(Self { session })
    }

    pub fn upload_script(&self) -> Result<()> {
        let payload = REMOTE_SCRIPT.as_bytes();
        let mut channel = self.session.scp_send(
            Path::new(REMOTE_SCRIPT_PATH),
            0o644,
            payload.len() as u64,
            None,
        )?;
        channel.write_all(payload)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        Ok(())
    }

    /// Run the export with the given positional arguments. Remote stdout
    /// is logged; a non-zero exit status is fatal.
    pub fn run_export(&self, python: &str, args: &[String]) -> Result<()> {
        let quoted = args.iter().map(|a| format!("\"{a}\"")).join(" ");
        let command = format!("{python} {REMOTE_SCRIPT_WINDOWS_PATH} {quoted}");
        info!("running remote export:\n{command}");

        let mut channel = self.session.channel_session()?;
        channel.exec(&command)?;
        let mut output = String::new();
        channel.read_to_string(&mut output)?;
        channel.wait_close()?;
        if !output.trim().is_empty() {
            info!("remote output: {}", output.trim());
        }
        let status = channel.exit_status()?;
        if status != 0 {
            return Err(EtlError::Remote(format!(
                "remote export exited with status {status}"
            )));
        }
        Ok(())
    }

    pub fn fetch_file(&self, remote_path: &str, dest: &Path) -> Result<()> {
        info!("fetching {remote_path}");
        let (mut channel, stat) = self.session.scp_recv(Path::new(remote_path))?;
        let mut contents = Vec::with_capacity(stat.size() as usize);
        channel.read_to_end(&mut contents)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        std::fs::write(dest, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_arg_round_trips_utf8() {
        let original = "שם שדה:NewName;אחר:Other";
        let encoded = hex_arg(original);
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex::decode(&encoded).unwrap(), original.as_bytes());
    }

    #[test]
    fn test_remote_script_is_embedded() {
        assert!(REMOTE_SCRIPT.contains("arcpy"));
    }
}
