//! Session detection from environment variables
//!
//! | Variable | Example | Description |
//! |----------|---------|-------------|
//! | `PROTON_CONNECT_SESSION` | `proton-connect` | Set on invocations started inside the session |
//! | `TMUX` | `/tmp/tmux-1000/default,4242,0` | Set by tmux for every client |
//!
//! Detection only reads variables, so calling it repeatedly in the same
//! environment always gives the same answer.

use super::machine::SessionState;
use crate::multiplexer::SESSION_MARKER_ENV;
use std::env;

/// What the environment says about the current process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Session name carried by the marker, if any
    pub marker: Option<String>,
    /// Inside some tmux client, ours or not
    pub in_tmux: bool,
}

impl SessionContext {
    /// Read the current process environment
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| env::var(key))
    }

    /// Read the environment through a custom getter (for testing)
    pub fn from_env_fn<F>(get_var: F) -> Self
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let marker = get_var(SESSION_MARKER_ENV).ok().filter(|value| !value.is_empty());
        let in_tmux = get_var("TMUX").is_ok_and(|value| !value.is_empty());

        Self { marker, in_tmux }
    }

    /// Classify the process relative to the session called `session`
    pub fn detect(&self, session: &str) -> SessionState {
        match &self.marker {
            Some(marker) if marker == session => SessionState::InsideMultiplexer,
            _ => SessionState::OutsideMultiplexer,
        }
    }

    /// Inside a tmux client that is not our session's invocation
    pub fn nested(&self, session: &str) -> bool {
        self.in_tmux && self.detect(session) == SessionState::OutsideMultiplexer
    }
}
