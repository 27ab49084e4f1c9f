//! Endpoint records parsed from OpenVPN configuration files
//!
//! Only what the catalog needs is extracted; the file itself is handed to
//! OpenVPN untouched.
//!
//! # Recognized content
//!
//! | Line | Effect |
//! |------|--------|
//! | `# country: NL` | Country code (overrides the file-name prefix) |
//! | `remote HOST [PORT [PROTO]]` | First one becomes the endpoint's remote |
//! | `proto udp` | Transport protocol |

use super::country::{CountryCode, CountryCodeError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension of endpoint files
pub const ENDPOINT_EXTENSION: &str = "ovpn";

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("File name is not valid UTF-8")]
    InvalidName,
    #[error("No remote directive")]
    NoRemote,
    #[error("Invalid country metadata: {0}")]
    InvalidCountry(#[from] CountryCodeError),
    #[error("Endpoint name '{0}' already taken by another file")]
    DuplicateName(String),
}

/// Server address from the first `remote` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub host: String,
    pub port: Option<u16>,
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => f.write_str(&self.host),
        }
    }
}

/// One connectable VPN target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// File name without the `.ovpn` extension
    pub name: String,
    pub country_code: CountryCode,
    /// The configuration file handed to OpenVPN
    pub config_path: PathBuf,
    pub remote: Remote,
    /// `udp` or `tcp`, when the file says so
    pub protocol: Option<String>,
}

impl Endpoint {
    /// Parse the endpoint file at `path`
    pub fn from_file(path: &Path) -> Result<Self, ParseError> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or(ParseError::InvalidName)?;
        let content = fs::read_to_string(path)?;
        Self::parse(name, path, &content)
    }

    /// Parse endpoint `content`, as read from `path`
    pub fn parse(name: &str, path: &Path, content: &str) -> Result<Self, ParseError> {
        let mut metadata_country = None;
        let mut remote = None;
        let mut protocol = None;

        for line in content.lines() {
            let line = line.trim();

            if let Some(comment) = line.strip_prefix('#').or_else(|| line.strip_prefix(';')) {
                if metadata_country.is_none() {
                    if let Some(value) = metadata_value(comment, "country") {
                        metadata_country = Some(value.parse::<CountryCode>()?);
                    }
                }
                continue;
            }

            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("remote") if remote.is_none() => {
                    let Some(host) = parts.next() else { continue };
                    let port = parts.next().and_then(|p| p.parse().ok());
                    if let Some(proto) = parts.next() {
                        protocol.get_or_insert_with(|| proto.to_string());
                    }
                    remote = Some(Remote {
                        host: host.to_string(),
                        port,
                    });
                }
                Some("proto") => {
                    if let Some(proto) = parts.next() {
                        protocol = Some(proto.to_string());
                    }
                }
                _ => {}
            }
        }

        let remote = remote.ok_or(ParseError::NoRemote)?;
        let country_code = metadata_country
            .or_else(|| CountryCode::from_name_prefix(name))
            .unwrap_or(CountryCode::Unknown);

        Ok(Self {
            name: name.to_string(),
            country_code,
            config_path: path.to_path_buf(),
            remote,
            protocol,
        })
    }
}

/// Value of a `key: value` or `key = value` comment, matching `key` case-insensitively
fn metadata_value<'a>(comment: &'a str, key: &str) -> Option<&'a str> {
    let (found, value) = comment.split_once([':', '='])?;
    if found.trim().eq_ignore_ascii_case(key) {
        Some(value.trim())
    } else {
        None
    }
}

/// Whether `path` looks like an endpoint file
pub fn is_endpoint_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ENDPOINT_EXTENSION))
}
