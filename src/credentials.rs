//! VPN credential resolution
//!
//! The storage mode is chosen once during `init` and read from `config.toml`.
//! The credentials file and the keychain entry use the two-line layout of
//! OpenVPN's `auth-user-pass` file: username on the first line, secret on the
//! second. `pass` entries may instead follow the `pass` convention of the
//! password first and a `login:` line further down.
//!
//! Credentials are resolved fresh for each connection and never cached.

use crate::config::{CredentialMode, StoreBackend, StoreConfig};
use keyring::Entry;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

/// Keychain service name for the keyring backend
pub const SERVICE_NAME: &str = "proton-connect";

/// Field names accepted for the username in a `pass` entry
const LOGIN_FIELDS: &[&str] = &["login", "username", "user"];

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credentials file not found: {0}")]
    Missing(PathBuf),
    #[error("Failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed credentials from {0}: expected username and secret on two lines")]
    Malformed(String),
    #[error("Secret store command '{command}' failed: {message}")]
    Store { command: String, message: String },
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Secret store returned nothing for '{0}'")]
    Empty(String),
    #[error("Failed to write credentials file: {0}")]
    Write(io::Error),
}

/// Resolved secret material for one connection attempt
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Nothing stored; OpenVPN prompts on the terminal
    Interactive,
    UserPass { username: String, secret: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Interactive => f.write_str("Interactive"),
            Credential::UserPass { username, .. } => f
                .debug_struct("UserPass")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

impl Credential {
    /// Parse the two-line `username\nsecret` layout
    ///
    /// Each line is taken verbatim minus its line ending.
    pub fn parse(content: &str, source: &str) -> Result<Self, CredentialError> {
        let mut lines = content.lines();
        let username = lines.next().unwrap_or_default();
        let secret = lines.next().unwrap_or_default();

        if username.is_empty() || secret.is_empty() {
            return Err(CredentialError::Malformed(source.to_string()));
        }

        Ok(Credential::UserPass {
            username: username.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Parse a `pass` entry
    ///
    /// With a `login:` field the first line is the secret. Without one the
    /// entry is read as the two-line `username\nsecret` layout.
    pub fn parse_pass_entry(content: &str, source: &str) -> Result<Self, CredentialError> {
        let mut lines = content.lines();
        let first = lines.next().unwrap_or_default();
        let login = lines.find_map(|line| {
            let (field, value) = line.split_once(':')?;
            let field = field.trim();
            LOGIN_FIELDS
                .iter()
                .any(|name| field.eq_ignore_ascii_case(name))
                .then(|| value.trim())
        });

        let Some(username) = login else {
            return Self::parse(content, source);
        };
        if username.is_empty() || first.is_empty() {
            return Err(CredentialError::Malformed(source.to_string()));
        }

        Ok(Credential::UserPass {
            username: username.to_string(),
            secret: first.to_string(),
        })
    }

    /// Content for OpenVPN's `auth-user-pass` input
    pub fn auth_input(&self) -> Option<String> {
        match self {
            Credential::Interactive => None,
            Credential::UserPass { username, secret } => {
                Some(format!("{}\n{}\n", username, secret))
            }
        }
    }
}

/// Produces a [`Credential`] according to the configured mode
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    mode: CredentialMode,
    credentials_file: PathBuf,
    store: StoreConfig,
}

impl CredentialResolver {
    pub fn new(mode: CredentialMode, credentials_file: PathBuf, store: StoreConfig) -> Self {
        Self {
            mode,
            credentials_file,
            store,
        }
    }

    pub fn resolve(&self) -> Result<Credential, CredentialError> {
        debug!("Resolving credentials, mode={:?}", self.mode);

        match self.mode {
            CredentialMode::PlaintextFile => {
                let credential = read_credentials_file(&self.credentials_file)?;
                info!("Using credentials from {}", self.credentials_file.display());
                Ok(credential)
            }
            CredentialMode::ExternalStore => match self.store.backend {
                StoreBackend::Pass => query_pass(&self.store.command, &self.store.key),
                StoreBackend::Keyring => query_keyring(&self.store.key),
            },
            CredentialMode::None => Ok(Credential::Interactive),
        }
    }

    /// Check that [`resolve`](Self::resolve) has something to read
    ///
    /// The plaintext file is read and parsed. Secret stores are not queried,
    /// since `pass` may prompt for the GPG passphrase.
    pub fn check(&self) -> Result<(), CredentialError> {
        match self.mode {
            CredentialMode::PlaintextFile => {
                read_credentials_file(&self.credentials_file)?;
                Ok(())
            }
            CredentialMode::ExternalStore | CredentialMode::None => Ok(()),
        }
    }
}

fn read_credentials_file(path: &Path) -> Result<Credential, CredentialError> {
    if !path.exists() {
        return Err(CredentialError::Missing(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Credential::parse(&content, &path.display().to_string())
}

/// Run `<command> show <key>` and parse its output
fn query_pass(command: &str, key: &str) -> Result<Credential, CredentialError> {
    let store_error = |message: String| CredentialError::Store {
        command: command.to_string(),
        message,
    };

    let output = Command::new(command)
        .args(["show", key])
        .stdin(Stdio::inherit())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| store_error(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(store_error(stderr.trim().to_string()));
    }

    let content = String::from_utf8(output.stdout)
        .map_err(|_| store_error("output is not valid UTF-8".to_string()))?;
    if content.trim().is_empty() {
        return Err(CredentialError::Empty(key.to_string()));
    }

    let credential = Credential::parse_pass_entry(&content, key)?;
    info!("Using credentials from secret store entry {}", key);
    Ok(credential)
}

fn query_keyring(key: &str) -> Result<Credential, CredentialError> {
    let entry = Entry::new(SERVICE_NAME, key)?;
    let content = match entry.get_password() {
        Ok(content) => content,
        Err(keyring::Error::NoEntry) => return Err(CredentialError::Empty(key.to_string())),
        Err(e) => return Err(e.into()),
    };

    let credential = Credential::parse(&content, key)?;
    info!("Using credentials from keychain entry {}", key);
    Ok(credential)
}

/// Write the plaintext credentials file with owner-only permissions
pub fn store_credentials_file(
    path: &Path,
    username: &str,
    secret: &str,
) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(CredentialError::Write)?;
    }

    fs::write(path, format!("{}\n{}\n", username, secret)).map_err(CredentialError::Write)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, permissions).map_err(CredentialError::Write)?;
    }

    info!("Credentials stored in {}", path.display());
    Ok(())
}

/// Store credentials in the OS keychain under `key`
pub fn store_keyring(key: &str, username: &str, secret: &str) -> Result<(), CredentialError> {
    let entry = Entry::new(SERVICE_NAME, key)?;
    entry.set_password(&format!("{}\n{}", username, secret))?;
    info!("Credentials stored in keychain entry {}", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver(mode: CredentialMode, dir: &TempDir, store: StoreConfig) -> CredentialResolver {
        CredentialResolver::new(mode, dir.path().join("credentials"), store)
    }

    #[cfg(unix)]
    fn fake_pass(dir: &TempDir, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-pass");
        fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_parse_two_lines() {
        let credential = Credential::parse("alice\ns3cret\n", "test").unwrap();
        assert_eq!(
            credential,
            Credential::UserPass {
                username: "alice".to_string(),
                secret: "s3cret".to_string()
            }
        );
    }

    #[test]
    fn test_parse_keeps_inner_whitespace() {
        let credential = Credential::parse("alice+pmp\r\n pass word \r\n", "test").unwrap();
        assert_eq!(
            credential,
            Credential::UserPass {
                username: "alice+pmp".to_string(),
                secret: " pass word ".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_single_line() {
        let result = Credential::parse("alice\n", "test");
        assert!(matches!(result, Err(CredentialError::Malformed(_))));
    }

    #[test]
    fn test_parse_pass_entry_with_login_field() {
        let content = "s3cret\nLogin: alice+pmp\nurl: https://account.protonvpn.com\n";
        let credential = Credential::parse_pass_entry(content, "test").unwrap();
        assert_eq!(
            credential,
            Credential::UserPass {
                username: "alice+pmp".to_string(),
                secret: "s3cret".to_string()
            }
        );
    }

    #[test]
    fn test_parse_pass_entry_two_lines() {
        let credential = Credential::parse_pass_entry("alice\ns3cret\n", "test").unwrap();
        assert_eq!(credential.auth_input().as_deref(), Some("alice\ns3cret\n"));

        let result = Credential::parse_pass_entry("s3cret\nlogin:\n", "test");
        assert!(matches!(result, Err(CredentialError::Malformed(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::UserPass {
            username: "alice".to_string(),
            secret: "hunter2".to_string(),
        };
        let debug = format!("{:?}", credential);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_auth_input() {
        assert_eq!(Credential::Interactive.auth_input(), None);
        let credential = Credential::UserPass {
            username: "alice".to_string(),
            secret: "s3cret".to_string(),
        };
        assert_eq!(credential.auth_input().as_deref(), Some("alice\ns3cret\n"));
    }

    #[test]
    fn test_mode_none_is_interactive() {
        let temp_dir = TempDir::new().unwrap();
        let credential = resolver(CredentialMode::None, &temp_dir, StoreConfig::default())
            .resolve()
            .unwrap();
        assert_eq!(credential, Credential::Interactive);
    }

    #[test]
    fn test_plaintext_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials");
        store_credentials_file(&path, "alice", "s3cret").unwrap();

        let credential = resolver(CredentialMode::PlaintextFile, &temp_dir, StoreConfig::default())
            .resolve()
            .unwrap();
        assert_eq!(credential.auth_input().as_deref(), Some("alice\ns3cret\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_plaintext_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("credentials");
        store_credentials_file(&path, "alice", "s3cret").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_plaintext_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result =
            resolver(CredentialMode::PlaintextFile, &temp_dir, StoreConfig::default()).resolve();
        assert!(matches!(result, Err(CredentialError::Missing(_))));
    }

    #[test]
    fn test_check_plaintext_file() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = resolver(CredentialMode::PlaintextFile, &temp_dir, StoreConfig::default());
        assert!(matches!(resolver.check(), Err(CredentialError::Missing(_))));

        fs::write(temp_dir.path().join("credentials"), "alice\n").unwrap();
        assert!(matches!(resolver.check(), Err(CredentialError::Malformed(_))));

        store_credentials_file(&temp_dir.path().join("credentials"), "alice", "s3cret").unwrap();
        assert!(resolver.check().is_ok());
    }

    #[test]
    fn test_check_never_queries_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = StoreConfig {
            backend: StoreBackend::Pass,
            key: "vpn/proton".to_string(),
            command: temp_dir.path().join("no-such-pass").to_string_lossy().into_owned(),
        };

        assert!(resolver(CredentialMode::ExternalStore, &temp_dir, store).check().is_ok());
        let none = resolver(CredentialMode::None, &temp_dir, StoreConfig::default());
        assert!(none.check().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_pass_backend() {
        let temp_dir = TempDir::new().unwrap();
        let store = StoreConfig {
            backend: StoreBackend::Pass,
            key: "vpn/proton".to_string(),
            command: fake_pass(
                &temp_dir,
                "[ \"$1\" = show ] && [ \"$2\" = vpn/proton ] && printf 'alice\\ns3cret\\n'",
            ),
        };

        let credential = resolver(CredentialMode::ExternalStore, &temp_dir, store)
            .resolve()
            .unwrap();
        assert_eq!(credential.auth_input().as_deref(), Some("alice\ns3cret\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_pass_backend_password_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = StoreConfig {
            backend: StoreBackend::Pass,
            key: "vpn/proton".to_string(),
            command: fake_pass(&temp_dir, "printf 's3cret\\nlogin: alice\\n'"),
        };

        let credential = resolver(CredentialMode::ExternalStore, &temp_dir, store)
            .resolve()
            .unwrap();
        assert_eq!(credential.auth_input().as_deref(), Some("alice\ns3cret\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_pass_backend_failure() {
        let temp_dir = TempDir::new().unwrap();
        let store = StoreConfig {
            backend: StoreBackend::Pass,
            key: "vpn/proton".to_string(),
            command: fake_pass(&temp_dir, "echo 'not in the password store' >&2; exit 1"),
        };

        let result = resolver(CredentialMode::ExternalStore, &temp_dir, store).resolve();
        match result {
            Err(CredentialError::Store { message, .. }) => {
                assert!(message.contains("not in the password store"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_pass_backend_empty_output() {
        let temp_dir = TempDir::new().unwrap();
        let store = StoreConfig {
            backend: StoreBackend::Pass,
            key: "vpn/proton".to_string(),
            command: fake_pass(&temp_dir, "exit 0"),
        };

        let result = resolver(CredentialMode::ExternalStore, &temp_dir, store).resolve();
        assert!(matches!(result, Err(CredentialError::Empty(_))));
    }

    #[test]
    fn test_pass_backend_missing_binary() {
        let temp_dir = TempDir::new().unwrap();
        let store = StoreConfig {
            backend: StoreBackend::Pass,
            key: "vpn/proton".to_string(),
            command: temp_dir.path().join("no-such-pass").to_string_lossy().into_owned(),
        };

        let result = resolver(CredentialMode::ExternalStore, &temp_dir, store).resolve();
        assert!(matches!(result, Err(CredentialError::Store { .. })));
    }

    #[test]
    #[ignore] // Requires credential manager access
    fn test_keyring_store_and_resolve() {
        let temp_dir = TempDir::new().unwrap();
        let key = "proton-connect-test-entry";
        store_keyring(key, "alice", "s3cret").unwrap();

        let store = StoreConfig {
            backend: StoreBackend::Keyring,
            key: key.to_string(),
            command: String::new(),
        };
        let credential = resolver(CredentialMode::ExternalStore, &temp_dir, store)
            .resolve()
            .unwrap();
        assert_eq!(credential.auth_input().as_deref(), Some("alice\ns3cret\n"));

        Entry::new(SERVICE_NAME, key).unwrap().delete_credential().unwrap();
    }
}
