//! Session lifecycle controller
//!
//! A connection only starts inside the named multiplexer session. From a
//! plain terminal the controller attaches to (or creates) the session and a
//! fresh invocation of this tool, with identical arguments, runs there.
//! Nothing about the endpoint or the credentials is decided before the
//! handoff; the invocation inside the session resolves both itself.
//!
//! # Lifecycle
//!
//! 1. Detect: the `PROTON_CONNECT_SESSION` marker names our session → inside
//! 2. Outside: attach to the existing session, or create it
//! 3. Inside: launch the tunnel and wait for it

pub mod env;
pub mod machine;

pub use env::SessionContext;
pub use machine::{Directive, Event, InvalidTransition, SessionState, advance};

use crate::multiplexer::{Invocation, Multiplexer, MultiplexerError};
use crate::tunnel::TunnelExit;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Multiplexer error: {0}")]
    Multiplexer(#[from] MultiplexerError),
    #[error("Session state machine: {0}")]
    InvalidTransition(InvalidTransition),
}

impl From<InvalidTransition> for SessionError {
    fn from(err: InvalidTransition) -> Self {
        SessionError::InvalidTransition(err)
    }
}

/// How a run of the controller ended in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The terminal now belongs to the session, which runs a fresh invocation
    HandedOff { created: bool },
    Connected,
    Failed(TunnelExit),
}

impl Outcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::HandedOff { .. } | Outcome::Connected => 0,
            Outcome::Failed(exit) => exit.code,
        }
    }
}

/// Drives the [`machine`] against a [`Multiplexer`]
pub struct SessionController<M> {
    multiplexer: M,
    session: String,
}

impl<M: Multiplexer> SessionController<M> {
    pub fn new(multiplexer: M, session: impl Into<String>) -> Self {
        Self {
            multiplexer,
            session: session.into(),
        }
    }

    /// Run the state machine to completion
    ///
    /// `launch` runs only inside the session. It resolves the endpoint and
    /// the credentials and waits for the tunnel.
    pub fn run<F, E>(
        &self,
        context: &SessionContext,
        invocation: &Invocation,
        launch: F,
    ) -> Result<Outcome, E>
    where
        F: FnOnce() -> Result<TunnelExit, E>,
        E: From<SessionError>,
    {
        let detected = context.detect(&self.session);
        info!("Session '{}': {}", self.session, detected);

        let mut launch = Some(launch);
        let mut state = SessionState::Detecting;
        let mut event = Event::Detected(detected);
        let mut created = false;
        let mut tunnel_exit = None;

        loop {
            let (next, directive) = advance(state, event).map_err(SessionError::from)?;
            if next != state {
                debug!("{} -> {} ({:?})", state, next, directive);
            }
            state = next;

            event = match directive {
                Directive::Attach => match self.multiplexer.attach(&self.session, invocation) {
                    Ok(()) => Event::HandedOff,
                    Err(MultiplexerError::NoSuchSession(_)) => {
                        info!("No session named '{}', creating it", self.session);
                        Event::NoSuchSession
                    }
                    Err(e) => return Err(SessionError::from(e).into()),
                },
                Directive::Create => {
                    self.multiplexer
                        .create(&self.session, invocation)
                        .map_err(SessionError::from)?;
                    created = true;
                    Event::HandedOff
                }
                Directive::Launch => {
                    let Some(launch) = launch.take() else {
                        return Err(SessionError::from(InvalidTransition { state, event }).into());
                    };
                    match launch() {
                        Ok(exit) => {
                            tunnel_exit = Some(exit);
                            Event::TunnelExited {
                                success: exit.success(),
                            }
                        }
                        Err(e) => {
                            let failed = SessionState::Failed;
                            warn!("{} -> {}: tunnel could not be started", state, failed);
                            return Err(e);
                        }
                    }
                }
                Directive::Exit => {
                    return Ok(match (state, tunnel_exit) {
                        (SessionState::Connected, _) => Outcome::Connected,
                        (SessionState::Failed, Some(exit)) => Outcome::Failed(exit),
                        _ => Outcome::HandedOff { created },
                    });
                }
            };
        }
    }
}
