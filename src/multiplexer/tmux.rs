//! tmux implementation of the multiplexer seam
//!
//! Outside tmux the terminal is handed over by replacing this process with
//! `tmux attach-session` / `tmux new-session`. Inside a different tmux
//! session (`TMUX` set) nesting is refused by tmux, so the session is started
//! detached and the current client is switched to it instead.

use super::{Invocation, Multiplexer, MultiplexerError};
use std::ffi::OsString;
use std::process::{Command, Output, Stdio};
use tracing::{debug, info};

/// Name of the window running the tunnel
///
/// `new-window -S` selects a live window with this name instead of starting
/// a second tunnel next to it.
const WINDOW_NAME: &str = "proton-connect";

pub struct Tmux {
    program: String,
    /// Running inside some tmux client already
    nested: bool,
}

impl Tmux {
    pub fn new(program: impl Into<String>, nested: bool) -> Self {
        Self {
            program: program.into(),
            nested,
        }
    }

    /// Whether `session` exists on the default server
    ///
    /// A missing server counts as a missing session.
    pub fn has_session(&self, session: &str) -> Result<bool, MultiplexerError> {
        let args: [OsString; 3] = ["has-session".into(), "-t".into(), exact(session)];
        let output = self.run("has-session", args)?;
        Ok(output.status.success())
    }

    fn run<I>(&self, action: &str, args: I) -> Result<Output, MultiplexerError>
    where
        I: IntoIterator<Item = OsString>,
    {
        debug!("Running {} {}", self.program, action);
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| MultiplexerError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    fn run_checked<I>(&self, action: &str, args: I) -> Result<(), MultiplexerError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let output = self.run(action, args)?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(MultiplexerError::Command {
            program: self.program.clone(),
            action: action.to_string(),
            message: stderr,
        })
    }

    fn switch_client(&self, session: &str) -> Result<(), MultiplexerError> {
        let args: [OsString; 3] = ["switch-client".into(), "-t".into(), exact(session)];
        self.run_checked("switch-client", args)
    }

    /// Replace this process with `tmux args...`
    fn hand_over(&self, args: Vec<OsString>) -> MultiplexerError {
        let mut command = Command::new(&self.program);
        command.args(args);
        exec(command, &self.program)
    }
}

impl Multiplexer for Tmux {
    fn attach(&self, session: &str, invocation: &Invocation) -> Result<(), MultiplexerError> {
        if !self.has_session(session)? {
            return Err(MultiplexerError::NoSuchSession(session.to_string()));
        }

        let output = self.run("new-window", new_window_args(session, invocation))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // Session went away between the check and the window
            if stderr.contains("can't find session") {
                return Err(MultiplexerError::NoSuchSession(session.to_string()));
            }
            return Err(MultiplexerError::Command {
                program: self.program.clone(),
                action: "new-window".to_string(),
                message: stderr,
            });
        }

        info!("Attaching to tmux session {}", session);
        if self.nested {
            return self.switch_client(session);
        }
        Err(self.hand_over(vec!["attach-session".into(), "-t".into(), exact(session)]))
    }

    fn create(&self, session: &str, invocation: &Invocation) -> Result<(), MultiplexerError> {
        info!("Creating tmux session {}", session);
        if self.nested {
            self.run_checked("new-session", new_session_args(session, invocation, true))?;
            return self.switch_client(session);
        }
        Err(self.hand_over(new_session_args(session, invocation, false)))
    }
}

/// Target matching `session` exactly rather than by prefix
fn exact(session: &str) -> OsString {
    OsString::from(format!("={}", session))
}

fn new_window_args(session: &str, invocation: &Invocation) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "new-window".into(),
        "-S".into(),
        "-t".into(),
        format!("={}:", session).into(),
        "-n".into(),
        WINDOW_NAME.into(),
    ];
    args.extend(invocation.argv(session));
    args
}

fn new_session_args(session: &str, invocation: &Invocation, detached: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["new-session".into()];
    if detached {
        args.push("-d".into());
    }
    for arg in ["-s", session, "-n", WINDOW_NAME] {
        args.push(arg.into());
    }
    args.extend(invocation.argv(session));
    args
}

#[cfg(unix)]
fn exec(mut command: Command, program: &str) -> MultiplexerError {
    use std::os::unix::process::CommandExt;

    let source = command.exec();
    MultiplexerError::Exec {
        program: program.to_string(),
        source,
    }
}

#[cfg(not(unix))]
fn exec(mut command: Command, program: &str) -> MultiplexerError {
    match command.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(source) => MultiplexerError::Exec {
            program: program.to_string(),
            source,
        },
    }
}
