//! OpenVPN process management
//!
//! The tunnel is an `openvpn` child process bound to the selected endpoint's
//! configuration file. Stored credentials are piped through stdin
//! (`--auth-user-pass /dev/stdin`) so they never touch the disk; without them
//! OpenVPN prompts on the terminal itself.
//!
//! The wait is synchronous. Ctrl+C reaches OpenVPN through the terminal's
//! process group; this process ignores it so it can report the exit status.

use crate::catalog::Endpoint;
use crate::config::{Elevation, TunnelConfig};
use crate::credentials::Credential;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Exit code reported when the tunnel died without one
const UNKNOWN_EXIT_CODE: i32 = 1;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to pass credentials to OpenVPN: {0}")]
    Stdin(io::Error),
    #[error("Failed waiting for OpenVPN: {0}")]
    Wait(io::Error),
    #[error("Network command '{command}' failed: {reason}")]
    NetCmd { command: String, reason: String },
}

/// How the tunnel process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelExit {
    /// Exit code, `128 + signal` when killed by a signal
    pub code: i32,
    pub signal: Option<i32>,
}

impl TunnelExit {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self { code, signal: None };
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self {
                    code: 128 + signal,
                    signal: Some(signal),
                };
            }
        }

        Self {
            code: UNKNOWN_EXIT_CODE,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

/// A fully assembled OpenVPN command line
#[derive(Debug)]
pub struct TunnelCommand {
    pub program: String,
    pub args: Vec<OsString>,
    /// Fed to stdin when it carries a secret
    pub credential: Credential,
}

impl TunnelCommand {
    /// `[sudo] openvpn --config <file> [--auth-user-pass /dev/stdin] [extra...]`
    pub fn new(
        config: &TunnelConfig,
        endpoint: &Endpoint,
        credential: Credential,
        elevate: bool,
    ) -> Self {
        let mut args: Vec<OsString> = Vec::new();
        let program = if elevate {
            args.push(config.openvpn.clone().into());
            "sudo".to_string()
        } else {
            config.openvpn.clone()
        };

        args.push("--config".into());
        args.push(endpoint.config_path.clone().into_os_string());

        // After --config so it overrides the file's bare `auth-user-pass`
        if matches!(credential, Credential::UserPass { .. }) {
            args.push("--auth-user-pass".into());
            args.push("/dev/stdin".into());
        }

        args.extend(config.extra_args.iter().map(OsString::from));

        Self {
            program,
            args,
            credential,
        }
    }

    /// Run the tunnel and block until it exits
    pub fn launch(self) -> Result<TunnelExit, TunnelError> {
        install_interrupt_passthrough();

        let auth_input = self.credential.auth_input();
        info!("Starting {} ({} arguments)", self.program, self.args.len());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(if auth_input.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .spawn()
            .map_err(|source| TunnelError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let (Some(input), Some(mut stdin)) = (auth_input, child.stdin.take()) {
            match stdin.write_all(input.as_bytes()) {
                Ok(()) => debug!("Credentials passed to OpenVPN"),
                // Exited before reading; its status tells the story
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("OpenVPN closed stdin before reading credentials")
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(TunnelError::Stdin(e));
                }
            }
        }

        let status = child.wait().map_err(TunnelError::Wait)?;
        let exit = TunnelExit::from_status(status);
        log_exit(&exit);
        Ok(exit)
    }
}

/// Decide whether to prefix `sudo`
pub fn should_elevate(elevation: Elevation) -> bool {
    match elevation {
        Elevation::Always => true,
        Elevation::Never => false,
        Elevation::Auto => !is_root(),
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    true
}

/// Run the user's network setup command through `sh -c`, failing fast
pub fn run_netcmd(command: &str) -> Result<(), TunnelError> {
    info!("Running network command: {}", command);

    let status = Command::new("sh")
        .args(["-c", command])
        .status()
        .map_err(|e| TunnelError::NetCmd {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    if !status.success() {
        let exit = TunnelExit::from_status(status);
        return Err(TunnelError::NetCmd {
            command: command.to_string(),
            reason: format!("exit status {}", exit.code),
        });
    }

    Ok(())
}

/// Keep this process alive on Ctrl+C; the tunnel receives it directly
fn install_interrupt_passthrough() {
    let handler = || debug!("Interrupt received, waiting for OpenVPN to exit");
    if let Err(e) = ctrlc::set_handler(handler) {
        debug!("Interrupt handler not installed: {}", e);
    }
}

fn log_exit(exit: &TunnelExit) {
    match exit.signal {
        Some(signal) => warn!("OpenVPN terminated by {}", signal_name(signal)),
        None if exit.success() => info!("OpenVPN exited cleanly"),
        None => warn!("OpenVPN exited with status {}", exit.code),
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {}", signal))
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    format!("signal {}", signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CountryCode, Remote};
    use std::path::PathBuf;

    fn endpoint() -> Endpoint {
        Endpoint {
            name: "us-01".to_string(),
            country_code: CountryCode::Iso(*b"us"),
            config_path: PathBuf::from("/home/u/.proton-connect/configs/us-01.ovpn"),
            remote: Remote {
                host: "us-01.example.net".to_string(),
                port: Some(1194),
            },
            protocol: Some("udp".to_string()),
        }
    }

    fn user_pass() -> Credential {
        Credential::UserPass {
            username: "alice".to_string(),
            secret: "s3cret".to_string(),
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn shell(script: &str, credential: Credential) -> TunnelCommand {
        TunnelCommand {
            program: "sh".to_string(),
            args: vec!["-c".into(), script.into()],
            credential,
        }
    }

    #[test]
    fn test_interactive_command_has_no_credential_args() {
        let command = TunnelCommand::new(
            &TunnelConfig::default(),
            &endpoint(),
            Credential::Interactive,
            false,
        );

        assert_eq!(command.program, "openvpn");
        assert_eq!(
            strings(&command.args),
            vec!["--config", "/home/u/.proton-connect/configs/us-01.ovpn"]
        );
    }

    #[test]
    fn test_stored_credentials_use_stdin() {
        let command = TunnelCommand::new(&TunnelConfig::default(), &endpoint(), user_pass(), false);

        let args = strings(&command.args);
        assert_eq!(&args[2..], &["--auth-user-pass", "/dev/stdin"]);
        assert!(!args.iter().any(|a| a.contains("s3cret")));
        assert!(!format!("{:?}", command).contains("s3cret"));
    }

    #[test]
    fn test_elevated_command_with_extra_args() {
        let config = TunnelConfig {
            openvpn: "/usr/sbin/openvpn".to_string(),
            extra_args: vec!["--verb".to_string(), "4".to_string()],
            ..TunnelConfig::default()
        };
        let command = TunnelCommand::new(&config, &endpoint(), Credential::Interactive, true);

        assert_eq!(command.program, "sudo");
        assert_eq!(
            strings(&command.args),
            vec![
                "/usr/sbin/openvpn",
                "--config",
                "/home/u/.proton-connect/configs/us-01.ovpn",
                "--verb",
                "4"
            ]
        );
    }

    #[test]
    fn test_should_elevate() {
        assert!(should_elevate(Elevation::Always));
        assert!(!should_elevate(Elevation::Never));
        assert_eq!(should_elevate(Elevation::Auto), !is_root());
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_pipes_credentials() {
        let command = shell(
            "read u; read p; [ \"$u\" = alice ] && [ \"$p\" = s3cret ]",
            user_pass(),
        );
        let exit = command.launch().unwrap();
        assert!(exit.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_reports_exit_code() {
        let exit = shell("exit 4", Credential::Interactive).launch().unwrap();
        assert_eq!(exit, TunnelExit { code: 4, signal: None });
        assert!(!exit.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_reports_signal() {
        let exit = shell("kill -TERM $$", Credential::Interactive).launch().unwrap();
        assert_eq!(exit.signal, Some(15));
        assert_eq!(exit.code, 143);
        assert_eq!(signal_name(15), "SIGTERM");
    }

    #[test]
    fn test_launch_missing_binary() {
        let command = TunnelCommand {
            program: "/nonexistent/openvpn".to_string(),
            args: vec![],
            credential: Credential::Interactive,
        };
        assert!(matches!(command.launch(), Err(TunnelError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_netcmd() {
        assert!(run_netcmd("true").is_ok());

        let err = run_netcmd("exit 2").unwrap_err();
        assert!(matches!(err, TunnelError::NetCmd { .. }));
        assert!(err.to_string().contains("exit status 2"));
    }
}
