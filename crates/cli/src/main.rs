use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mtconnect_brokers_common::SimulatedTerminal;
use mtconnect_brokers_metatrader::{BridgeClient, BridgeConfig, ConnectionManager};
use mtconnect_core::*;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "mtconnect")]
#[command(about = "Connect to a MetaTrader 5 terminal using credentials from an INI file")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the terminal, log into an account, then shut down
    Check {
        /// Path to the INI configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Section holding the terminal `path`
        #[arg(short, long, default_value = "TERMINAL")]
        terminal: String,

        /// Section holding `login`, `password` and `server`
        #[arg(short, long)]
        account: String,

        /// Bridge host
        #[arg(long, env = "MTCONNECT_BRIDGE_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Bridge port
        #[arg(long, env = "MTCONNECT_BRIDGE_PORT", default_value = "5556")]
        port: u16,

        /// Use an in-process simulated terminal instead of the bridge
        #[arg(long)]
        simulate: bool,
    },

    /// Load the configuration and parse credentials without connecting
    Validate {
        /// Path to the INI configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Section holding the terminal `path`
        #[arg(short, long, default_value = "TERMINAL")]
        terminal: String,

        /// Account section to check
        #[arg(short, long)]
        account: Option<String>,
    },

    /// List the sections in a configuration file
    Sections {
        /// Path to the INI configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Check {
            config,
            terminal,
            account,
            host,
            port,
            simulate,
        } => {
            let client: Box<dyn TerminalClient> = if simulate {
                tracing::info!("Using simulated terminal");
                Box::new(SimulatedTerminal::default())
            } else {
                Box::new(BridgeClient::new(BridgeConfig { host, port }))
            };
            run_check(config, &terminal, &account, client)?;
        }
        Commands::Validate {
            config,
            terminal,
            account,
        } => {
            run_validate(config, &terminal, account.as_deref())?;
        }
        Commands::Sections { config } => {
            let store = ConfigStore::load(&config)?;
            println!("Sections in {}:", config.display());
            for section in store.sections() {
                println!("  {}", section);
            }
        }
    }

    Ok(())
}

fn run_check(
    config: PathBuf,
    terminal_section: &str,
    account_section: &str,
    client: Box<dyn TerminalClient>,
) -> Result<()> {
    let mut manager = ConnectionManager::new(config, terminal_section, client);

    let login = manager
        .with_session(|session| session.login(account_section))?
        .with_context(|| format!("Login from section '{}' failed", account_section))?;

    println!("Account #{} logged in and disconnected cleanly", login);
    Ok(())
}

fn run_validate(config: PathBuf, terminal_section: &str, account_section: Option<&str>) -> Result<()> {
    let store = ConfigStore::load(&config)?;

    let path = store
        .get(terminal_section, "path")
        .filter(|p| !p.is_empty())
        .unwrap_or("<auto-detect>");
    if store.has_section(terminal_section) {
        println!("Terminal path: {}", path);
    } else {
        println!(
            "Terminal section '{}' not found, path will be auto-detected",
            terminal_section
        );
    }

    if let Some(section) = account_section {
        let credentials = Credentials::from_config(&store, section)?;
        println!(
            "Account section '{}': login #{} on server '{}'",
            section, credentials.login, credentials.server
        );
    }

    Ok(())
}
