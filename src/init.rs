//! First-time setup
//!
//! Creates the state directory, records the credential mode in
//! `config.toml`, stores credentials where the mode needs them and optionally
//! imports already-extracted `.ovpn` files. Settings already present in
//! `config.toml` are kept.

use crate::catalog::endpoint::is_endpoint_file;
use crate::config::{Config, ConfigError, CredentialMode, Paths, StoreBackend};
use crate::credentials::{self, CredentialError};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Where ProtonVPN publishes the OpenVPN configuration bundle
pub const DOWNLOAD_URL: &str = "https://account.protonvpn.com/downloads";

#[derive(Error, Debug)]
pub enum InitError {
    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Credential(#[from] CredentialError),
    #[error("Failed to read input: {0}")]
    Prompt(io::Error),
}

/// Choices made on the `init` command line
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub mode: CredentialMode,
    pub backend: StoreBackend,
    /// Secret store entry, defaults to the configured one
    pub key: Option<String>,
    /// Directory of extracted `.ovpn` files to copy into `configs/`
    pub import: Option<PathBuf>,
}

impl InitOptions {
    /// Whether this tool has to store a username and secret itself
    pub fn needs_credentials(&self) -> bool {
        match self.mode {
            CredentialMode::PlaintextFile => true,
            CredentialMode::ExternalStore => self.backend == StoreBackend::Keyring,
            CredentialMode::None => false,
        }
    }
}

/// Run the setup flow
///
/// `prompt` is only called when the mode needs credentials stored by this
/// tool. `config.toml` is written last, so an aborted prompt keeps the
/// previous settings.
///
/// Returns the saved config and the number of imported endpoint files.
pub fn run<P>(paths: &Paths, options: &InitOptions, prompt: P) -> Result<(Config, usize), InitError>
where
    P: FnOnce() -> Result<(String, String), InitError>,
{
    let configs_dir = paths.configs_dir();
    fs::create_dir_all(&configs_dir).map_err(|source| InitError::Io {
        path: configs_dir.clone(),
        source,
    })?;

    let mut config = Config::load_or_default(paths)?;
    config.credentials.mode = options.mode;
    config.credentials.store.backend = options.backend;
    if let Some(key) = &options.key {
        config.credentials.store.key = key.clone();
    }

    if options.needs_credentials() {
        let (username, secret) = prompt()?;
        store_credentials(paths, &config, &username, &secret)?;
    }

    let imported = match &options.import {
        Some(source) => import_configs(source, &configs_dir)?,
        None => 0,
    };

    config.save(&paths.config_file())?;
    info!("Saved {}", paths.config_file().display());
    Ok((config, imported))
}

/// Copy every `.ovpn` file from `source` into `configs_dir`
pub fn import_configs(source: &Path, configs_dir: &Path) -> Result<usize, InitError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| InitError::Io { path, source }
    };

    let mut imported = 0;
    for entry in fs::read_dir(source).map_err(io_error(source))? {
        let path = entry.map_err(io_error(source))?.path();
        if !path.is_file() || !is_endpoint_file(&path) {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };

        let target = configs_dir.join(file_name);
        fs::copy(&path, &target).map_err(io_error(&target))?;
        debug!("Imported {}", target.display());
        imported += 1;
    }

    info!("Imported {} endpoint files from {}", imported, source.display());
    Ok(imported)
}

/// Store `username` and `secret` where `config` says they live
pub fn store_credentials(
    paths: &Paths,
    config: &Config,
    username: &str,
    secret: &str,
) -> Result<(), CredentialError> {
    match config.credentials.mode {
        CredentialMode::PlaintextFile => {
            credentials::store_credentials_file(&paths.credentials_file(), username, secret)
        }
        CredentialMode::ExternalStore => match config.credentials.store.backend {
            StoreBackend::Keyring => {
                credentials::store_keyring(&config.credentials.store.key, username, secret)
            }
            StoreBackend::Pass => Ok(()),
        },
        CredentialMode::None => Ok(()),
    }
}

/// Ask for the OpenVPN username on stdin and the secret without echo
pub fn prompt_credentials() -> Result<(String, String), InitError> {
    let stdin = io::stdin();
    let username = read_username(&mut stdin.lock(), &mut io::stderr()).map_err(InitError::Prompt)?;
    let secret = rpassword::prompt_password("OpenVPN password: ").map_err(InitError::Prompt)?;
    Ok((username, secret))
}

fn read_username<R: BufRead, W: Write>(input: &mut R, prompt: &mut W) -> io::Result<String> {
    write!(prompt, "OpenVPN username: ")?;
    prompt.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let username = line.trim_end_matches(['\r', '\n']).to_string();
    if username.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "username is empty"));
    }
    Ok(username)
}

/// Follow-up steps printed after `init`
pub fn next_steps(paths: &Paths, config: &Config, imported: usize) -> Vec<String> {
    let mut steps = Vec::new();

    if imported == 0 {
        steps.push(format!(
            "Download the OpenVPN configuration files from {} and extract the .ovpn files into {}",
            DOWNLOAD_URL,
            paths.configs_dir().display()
        ));
    }

    if config.credentials.mode == CredentialMode::ExternalStore
        && config.credentials.store.backend == StoreBackend::Pass
    {
        steps.push(format!(
            "Store your OpenVPN password with `{} insert -m {}`: password on the first line, \
             `login: <username>` on the second",
            config.credentials.store.command, config.credentials.store.key
        ));
    }

    steps.push("Run `proton-connect list` to see available countries".to_string());
    steps
}
