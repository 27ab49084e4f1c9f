//! Terminal multiplexer integration
//!
//! The connection runs inside a named, persistent multiplexer session so it
//! survives the terminal that started it. Handing the terminal to the session
//! replaces the current process; a fresh invocation of this tool then starts
//! inside the session, carrying [`SESSION_MARKER_ENV`].

pub mod tmux;

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use tmux::Tmux;

/// Set on invocations started inside the named session, holding its name
pub const SESSION_MARKER_ENV: &str = "PROTON_CONNECT_SESSION";

/// Variables copied into the re-invocation when set
///
/// Window commands inherit the multiplexer server's environment, not the
/// caller's.
pub const FORWARDED_ENV: &[&str] = &[crate::config::HOME_ENV, "RUST_LOG"];

#[derive(Error, Debug)]
pub enum MultiplexerError {
    #[error("No multiplexer session named '{0}'")]
    NoSuchSession(String),
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to hand terminal to {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} {action} failed: {message}")]
    Command {
        program: String,
        action: String,
        message: String,
    },
}

/// Hands control to a named persistent session
///
/// On success both methods replace the calling process, so `Ok` is only
/// observed with implementations that do not exec.
pub trait Multiplexer {
    /// Start `invocation` in the existing `session` and bind the terminal to it
    ///
    /// Returns [`MultiplexerError::NoSuchSession`] when the session is absent.
    fn attach(&self, session: &str, invocation: &Invocation) -> Result<(), MultiplexerError>;

    /// Create `session` with `invocation` as its initial command
    fn create(&self, session: &str, invocation: &Invocation) -> Result<(), MultiplexerError>;
}

/// Command line that re-runs this tool inside the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Environment assignments applied with `env`
    pub env: Vec<(String, OsString)>,
}

impl Invocation {
    /// The running executable with its original arguments
    pub fn current() -> io::Result<Self> {
        let program = std::env::current_exe()?;
        let args = std::env::args_os().skip(1).collect();
        let env = FORWARDED_ENV
            .iter()
            .filter_map(|key| std::env::var_os(key).map(|value| (key.to_string(), value)))
            .collect();

        Ok(Self { program, args, env })
    }

    /// argv for the session command: `env MARKER=session [VAR=value...] program args...`
    pub fn argv(&self, session: &str) -> Vec<OsString> {
        let mut argv = vec![OsString::from("env")];

        let mut marker = OsString::from(format!("{}=", SESSION_MARKER_ENV));
        marker.push(session);
        argv.push(marker);

        for (key, value) in &self.env {
            let mut assignment = OsString::from(format!("{}=", key));
            assignment.push(value);
            argv.push(assignment);
        }

        argv.push(self.program.clone().into_os_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}
