//! Arancel HTTP API — entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use arancel::{find_chromium, SqliteStore};
use arancel_server::config::ServerConfig;
use arancel_server::types::{ApiError, HistoryEntry, RateResponse};
use arancel_server::{AppState, HttpTransport};

#[derive(Parser)]
#[command(
    name = "arancel-server",
    about = "Tariff rate lookup against the DIAN portal, import cost simulation and history",
    version
)]
struct Cli {
    /// Path to the SQLite database. Also reads ARANCEL_DB.
    #[arg(long, global = true)]
    db: Option<String>,

    /// Per-step timeout for the portal, in seconds. Also reads ARANCEL_PORTAL_TIMEOUT_SECS.
    #[arg(long, global = true)]
    portal_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (default).
    Serve {
        /// Listen address (host:port). Also reads ARANCEL_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Allowed CORS origin; repeat for several.
        /// Also reads ARANCEL_CORS_ORIGINS (comma separated).
        #[arg(long = "cors-origin")]
        cors_origins: Vec<String>,
    },

    /// Resolve the rates of one classification code and print them as JSON.
    Lookup {
        /// Classification code (partida), digits only.
        partida: String,
    },

    /// Remove every cached rate.
    ClearCache,

    /// Print the most recent simulations as JSON.
    History {
        /// Number of simulations to print.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Check that a browser binary can be found and the database opens.
    Doctor,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   arancel-server completions bash > ~/.local/share/bash-completion/completions/arancel-server
    ///   arancel-server completions zsh > ~/.zfunc/_arancel-server
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.unwrap_or(Commands::Serve {
        addr: None,
        cors_origins: Vec::new(),
    });

    match command {
        Commands::Serve { addr, cors_origins } => {
            let config = ServerConfig::resolve(
                cli.db.as_deref(),
                addr.as_deref(),
                &cors_origins,
                cli.portal_timeout_secs,
            );
            tracing::info!("Arancel HTTP API");
            tracing::info!("Database: {}", config.db_path);
            tracing::info!("CORS origins: {}", config.cors_origins.join(", "));

            let state = AppState::from_config(&config)?;
            let transport = HttpTransport::new(state, config.cors_origins.clone());
            transport.run(&config.addr).await?;
        }

        Commands::Lookup { partida } => {
            let config = resolve_config(&cli.db, cli.portal_timeout_secs);
            let state = AppState::from_config(&config)?;
            let body = match state.resolver.resolve(&partida).await {
                Ok(rate) => serde_json::to_value(RateResponse::from(&rate))?,
                Err(e) => {
                    tracing::debug!("lookup failed: {e}");
                    let api: ApiError = e.into();
                    serde_json::json!({ "error": api.to_string(), "success": false })
                }
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::ClearCache => {
            let config = resolve_config(&cli.db, cli.portal_timeout_secs);
            let state = AppState::from_config(&config)?;
            let removed = state.resolver.cache().clear()?;
            println!("Cache limpiado ({removed} entries)");
        }

        Commands::History { limit } => {
            let config = resolve_config(&cli.db, cli.portal_timeout_secs);
            let state = AppState::from_config(&config)?;
            let entries: Vec<HistoryEntry> = state
                .simulator
                .recent_limited(limit)?
                .into_iter()
                .map(HistoryEntry::from)
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }

        Commands::Doctor => {
            let config = resolve_config(&cli.db, cli.portal_timeout_secs);
            let mut healthy = true;

            match find_chromium(config.chromium_path.as_ref()) {
                Some(path) => println!("Browser:  {}", path.display()),
                None => {
                    healthy = false;
                    println!("Browser:  not found (set ARANCEL_CHROMIUM_PATH or install Chromium)");
                }
            }

            match SqliteStore::open(&config.db_path) {
                Ok(_) => println!("Database: {} (ok)", config.db_path),
                Err(e) => {
                    healthy = false;
                    println!("Database: {} ({e})", config.db_path);
                }
            }

            println!("Timeout:  {}s per portal step", config.portal_timeout.as_secs());

            if !healthy {
                std::process::exit(1);
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "arancel-server", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn resolve_config(db: &Option<String>, portal_timeout_secs: Option<u64>) -> ServerConfig {
    ServerConfig::resolve(db.as_deref(), None, &[], portal_timeout_secs)
}
