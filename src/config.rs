//! Configuration handling for proton-connect
//!
//! Everything lives under a private state directory (`~/.proton-connect` by
//! default):
//!
//! | Path | Description |
//! |------|-------------|
//! | `configs/` | Downloaded `.ovpn` endpoint files |
//! | `config.toml` | Preferences, including the credential mode |
//! | `credentials` | Plaintext credentials (username, secret), mode 0600 |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const STATE_DIR_NAME: &str = ".proton-connect";
const CONFIGS_DIR_NAME: &str = "configs";
const CONFIG_FILE_NAME: &str = "config.toml";
const CREDENTIALS_FILE_NAME: &str = "credentials";

/// Environment variable overriding the state directory
pub const HOME_ENV: &str = "PROTON_CONNECT_HOME";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Could not determine home directory")]
    HomeNotFound,
}

/// Locations inside the state directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `explicit` when given, otherwise `~/.proton-connect`
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit {
            Some(root) => Ok(Self::new(root)),
            None => {
                let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
                Ok(Self::new(home.join(STATE_DIR_NAME)))
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.root.join(CONFIGS_DIR_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.root.join(CREDENTIALS_FILE_NAME)
    }
}

/// How VPN credentials are stored, chosen once during `init`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialMode {
    /// Two-line file in the state directory
    PlaintextFile,
    /// External secret store (`pass` or the OS keychain)
    ExternalStore,
    /// Let OpenVPN prompt interactively
    #[default]
    None,
}

/// Backend queried in [`CredentialMode::ExternalStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// The standard unix password manager
    #[default]
    Pass,
    /// OS keychain (Secret Service, macOS Keychain, Windows Credential Manager)
    Keyring,
}

/// When to run the tunnel through `sudo`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Elevation {
    /// Only when not already running as root
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub session: SessionConfig,
    pub tunnel: TunnelConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub mode: CredentialMode,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Entry name in the store
    pub key: String,
    /// Program used for the `pass` backend
    pub command: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Pass,
            key: "protonvpn/openvpn".to_string(),
            command: "pass".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the persistent tmux session
    pub name: String,
    /// tmux binary
    pub tmux: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "proton-connect".to_string(),
            tmux: "tmux".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// OpenVPN binary
    pub openvpn: String,
    pub sudo: Elevation,
    /// Network setup command run before every connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netcmd: Option<String>,
    /// Extra arguments appended to the OpenVPN command line
    pub extra_args: Vec<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            openvpn: "openvpn".to_string(),
            sudo: Elevation::Auto,
            netcmd: None,
            extra_args: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `config.toml` from the state directory, falling back to defaults
    pub fn load_or_default(paths: &Paths) -> Result<Self, ConfigError> {
        let path = paths.config_file();
        if path.exists() {
            return Self::load(&path);
        }

        info!("No config file at {}, using defaults", path.display());
        Ok(Self::default())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_layout() {
        let paths = Paths::new("/tmp/pc");
        assert_eq!(paths.configs_dir(), PathBuf::from("/tmp/pc/configs"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/pc/config.toml"));
        assert_eq!(paths.credentials_file(), PathBuf::from("/tmp/pc/credentials"));
    }

    #[test]
    fn test_paths_resolve_explicit() {
        let paths = Paths::resolve(Some(PathBuf::from("/srv/vpn"))).unwrap();
        assert_eq!(paths.root(), Path::new("/srv/vpn"));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.credentials.mode, CredentialMode::None);
        assert_eq!(config.session.name, "proton-connect");
        assert_eq!(config.tunnel.openvpn, "openvpn");
        assert_eq!(config.tunnel.sudo, Elevation::Auto);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [credentials]
            mode = "external-store"

            [credentials.store]
            key = "vpn/proton"

            [tunnel]
            netcmd = "nmcli radio wifi on"
            "#,
        )
        .unwrap();

        assert_eq!(config.credentials.mode, CredentialMode::ExternalStore);
        assert_eq!(config.credentials.store.backend, StoreBackend::Pass);
        assert_eq!(config.credentials.store.key, "vpn/proton");
        assert_eq!(config.credentials.store.command, "pass");
        assert_eq!(config.tunnel.netcmd.as_deref(), Some("nmcli radio wifi on"));
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let result: Result<Config, _> =
            toml::from_str("[credentials]\nmode = \"carrier-pigeon\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.credentials.mode = CredentialMode::PlaintextFile;
        config.tunnel.sudo = Elevation::Never;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::new(temp_dir.path());

        let config = Config::load_or_default(&paths).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::new(temp_dir.path());
        std::fs::write(paths.config_file(), "credentials = [").unwrap();

        let result = Config::load_or_default(&paths);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
