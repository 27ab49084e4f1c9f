//! `connect` command
//!
//! Wires the catalog, the selector, the credential resolver and the tunnel
//! into the [`SessionController`]. Everything below `establish` only runs
//! inside the named session.
//!
//! Once the session owns the terminal, errors of the invocation running
//! there no longer reach the caller's shell. So before handing over,
//! [`preflight`] checks what gives the same answer on both sides of the
//! handoff, and a failure inside the session holds its window open with
//! [`hold_window`].

use crate::catalog::{Catalog, CatalogError, CountryCode};
use crate::config::{Config, Paths};
use crate::credentials::{CredentialError, CredentialResolver};
use crate::multiplexer::{Invocation, Multiplexer, Tmux};
use crate::select::{self, SelectError, Selection, select};
use crate::session::{Outcome, SessionContext, SessionController, SessionError, SessionState};
use crate::tunnel::{self, TunnelCommand, TunnelError, TunnelExit};
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("{0}")]
    Catalog(#[from] CatalogError),
    #[error("{0}")]
    Select(#[from] SelectError),
    #[error("Credentials unavailable: {0}")]
    Credential(#[from] CredentialError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Tunnel(#[from] TunnelError),
    #[error("Failed to determine own executable: {0}")]
    Invocation(io::Error),
}

impl ConnectError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ConnectError::Select(_) => 2,
            _ => 1,
        }
    }
}

/// Arguments of `connect`
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub endpoint: Option<String>,
    pub country: Option<CountryCode>,
    /// Overrides the configured network command
    pub netcmd: Option<String>,
}

impl ConnectRequest {
    fn selection(&self) -> Selection {
        Selection {
            name: self.endpoint.clone(),
            country: self.country,
        }
    }
}

/// Run the session state machine for this process
pub fn connect(
    paths: &Paths,
    config: &Config,
    request: &ConnectRequest,
) -> Result<Outcome, ConnectError> {
    let context = SessionContext::from_env();
    let multiplexer = Tmux::new(
        config.session.tmux.clone(),
        context.nested(&config.session.name),
    );
    let invocation = Invocation::current().map_err(ConnectError::Invocation)?;

    connect_with(paths, config, request, &context, multiplexer, &invocation)
}

/// [`connect`] with an explicit environment and multiplexer
pub fn connect_with<M: Multiplexer>(
    paths: &Paths,
    config: &Config,
    request: &ConnectRequest,
    context: &SessionContext,
    multiplexer: M,
    invocation: &Invocation,
) -> Result<Outcome, ConnectError> {
    let session = &config.session.name;
    if context.detect(session) == SessionState::OutsideMultiplexer {
        preflight(paths, config, request)?;
        if !request.selection().is_deterministic() {
            debug!("Random selection happens inside the session");
        }
    }

    let controller = SessionController::new(multiplexer, session.clone());
    controller.run(context, invocation, || establish(paths, config, request))
}

/// Check the inputs [`establish`] will see, without picking or connecting
///
/// Builds the catalog, makes sure a named endpoint or country exists and
/// that the credentials file is usable. The random pick and secret store
/// lookups stay inside the session.
pub fn preflight(
    paths: &Paths,
    config: &Config,
    request: &ConnectRequest,
) -> Result<(), ConnectError> {
    let catalog = load_catalog(paths)?;
    select::validate(&catalog, &request.selection())?;
    resolver(paths, config).check()?;
    debug!("Preflight passed");
    Ok(())
}

/// Resolve endpoint and credentials, then run the tunnel
pub fn establish(
    paths: &Paths,
    config: &Config,
    request: &ConnectRequest,
) -> Result<TunnelExit, ConnectError> {
    let catalog = load_catalog(paths)?;
    let endpoint = select(&catalog, &request.selection(), &mut rand::thread_rng())?;
    info!(
        "Selected endpoint {} ({}, {})",
        endpoint.name, endpoint.country_code, endpoint.remote
    );

    let credential = resolver(paths, config).resolve()?;

    if let Some(command) = request.netcmd.as_ref().or(config.tunnel.netcmd.as_ref()) {
        tunnel::run_netcmd(command)?;
    }

    let elevate = tunnel::should_elevate(config.tunnel.sudo);
    let command = TunnelCommand::new(&config.tunnel, endpoint, credential, elevate);
    Ok(command.launch()?)
}

fn resolver(paths: &Paths, config: &Config) -> CredentialResolver {
    CredentialResolver::new(
        config.credentials.mode,
        paths.credentials_file(),
        config.credentials.store.clone(),
    )
}

/// Build the catalog and log skipped files at debug level
pub fn load_catalog(paths: &Paths) -> Result<Catalog, CatalogError> {
    let catalog = Catalog::build(&paths.configs_dir())?;
    for warning in catalog.warnings() {
        debug!("Skipped {}: {}", warning.path.display(), warning.error);
    }
    debug!(
        "Catalog: {} endpoints in {} countries",
        catalog.len(),
        catalog.countries().count()
    );
    Ok(catalog)
}

/// Wait for Enter so a failed session window stays readable
///
/// tmux closes the window as soon as the process exits.
pub fn hold_window<R: BufRead, W: Write>(input: &mut R, prompt: &mut W) -> io::Result<()> {
    write!(prompt, "Press Enter to close this window")?;
    prompt.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(())
}
