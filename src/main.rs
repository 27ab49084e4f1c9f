use clap::{Parser, Subcommand};
use proton_connect::catalog::CountryCode;
use proton_connect::config::{CredentialMode, HOME_ENV, StoreBackend};
use proton_connect::connect::{hold_window, load_catalog};
use proton_connect::init::{self, InitOptions};
use proton_connect::session::{SessionContext, SessionState};
use proton_connect::{Config, ConnectRequest, Outcome, Paths};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "proton-connect")]
#[command(about = "Detachable ProtonVPN connections inside a persistent tmux session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (lists endpoint names, shows skipped files)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// State directory [default: ~/.proton-connect]
    #[arg(long, global = true, env = HOME_ENV)]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize proton-connect
    Init {
        /// How credentials are stored
        #[arg(long, value_enum, default_value_t = CredentialMode::PlaintextFile)]
        mode: CredentialMode,
        /// Secret store used with `--mode external-store`
        #[arg(long, value_enum, default_value_t = StoreBackend::Pass)]
        backend: StoreBackend,
        /// Secret store entry holding username and password
        #[arg(long)]
        key: Option<String>,
        /// Directory of extracted .ovpn files to import
        #[arg(long)]
        import: Option<PathBuf>,
    },
    /// List available VPNs, grouped by country
    List {
        /// Countries to list (all if omitted)
        countries: Vec<CountryCode>,
    },
    /// Connect to ProtonVPN inside the persistent session
    Connect {
        /// Endpoint name; chosen randomly if omitted
        endpoint: Option<String>,
        /// Pick randomly among this country's endpoints
        #[arg(short, long)]
        country: Option<CountryCode>,
        /// Command to run before the tunnel starts
        #[arg(long)]
        netcmd: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging
    // stdout is reserved for `list` output
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let paths = Paths::resolve(cli.home)?;

    match cli.command {
        Commands::Init {
            mode,
            backend,
            key,
            import,
        } => {
            info!("Initializing {}", paths.root().display());
            let options = InitOptions {
                mode,
                backend,
                key,
                import,
            };
            let (config, imported) = init::run(&paths, &options, init::prompt_credentials)?;

            println!("Initialized {}", paths.root().display());
            for step in init::next_steps(&paths, &config, imported) {
                println!("  - {}", step);
            }
        }
        Commands::List { countries } => {
            let catalog = match load_catalog(&paths) {
                Ok(catalog) => catalog,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(1);
                }
            };

            let mut stdout = std::io::stdout().lock();
            let missing = catalog.write_listing(&mut stdout, &countries, cli.verbose)?;
            for code in missing {
                warn!("No endpoints for country '{}'", code);
            }
        }
        Commands::Connect {
            endpoint,
            country,
            netcmd,
        } => {
            let config = Config::load_or_default(&paths)?;
            let request = ConnectRequest {
                endpoint,
                country,
                netcmd,
            };
            let in_session = SessionContext::from_env().detect(&config.session.name)
                == SessionState::InsideMultiplexer;

            match proton_connect::connect(&paths, &config, &request) {
                Ok(Outcome::HandedOff { created }) => {
                    if created {
                        info!("Session '{}' created", config.session.name);
                    }
                }
                Ok(Outcome::Connected) => {
                    info!("Tunnel closed");
                }
                Ok(outcome @ Outcome::Failed(_)) => {
                    error!("Connection failed");
                    exit_after_failure(in_session, outcome.exit_code());
                }
                Err(e) => {
                    error!("Connect failed: {}", e);
                    exit_after_failure(in_session, e.exit_code());
                }
            }
        }
    }

    Ok(())
}

/// Exit with `code`, keeping a session window open until Enter
fn exit_after_failure(in_session: bool, code: i32) -> ! {
    if in_session {
        if let Err(e) = hold_window(&mut std::io::stdin().lock(), &mut std::io::stderr()) {
            warn!("Closing window: {}", e);
        }
    }
    std::process::exit(code)
}
