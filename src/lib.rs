//! proton-connect - detachable ProtonVPN connections
//!
//! Catalogs the OpenVPN configuration files downloaded from ProtonVPN,
//! lists them by country and runs OpenVPN inside a persistent tmux session,
//! so the tunnel outlives the terminal that started it.
//!
//! # Architecture
//!
//! - `config`: State directory layout and preferences (TOML)
//! - `catalog`: Endpoint parsing and grouping by country
//! - `select`: Named or uniformly random endpoint selection
//! - `credentials`: Plaintext file, secret store or interactive credentials
//! - `multiplexer`: tmux session handoff
//! - `session`: Session lifecycle state machine and controller
//! - `tunnel`: OpenVPN process management
//! - `connect` / `init`: Command implementations
//!
//! # Usage
//!
//! ```bash
//! proton-connect init --mode plaintext-file --import ~/Downloads/ovpn
//! proton-connect list nl -v
//! proton-connect connect --country nl
//! ```

pub mod catalog;
pub mod config;
pub mod connect;
pub mod credentials;
pub mod init;
pub mod multiplexer;
pub mod select;
pub mod session;
pub mod tunnel;

pub use catalog::{Catalog, CountryCode, Endpoint};
pub use config::{Config, Paths};
pub use connect::{ConnectError, ConnectRequest, connect};
pub use session::Outcome;
