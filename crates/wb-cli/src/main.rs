//! whalebridge CLI
//!
//! Reaches a container engine on a remote host: directly if its TCP port is
//! open, otherwise over SSH, and prints a local endpoint to point clients at.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wb_core::config::default_config_path;
use wb_core::Method;
use whalebridge::commands::{self, ConnectArgs};
use whalebridge::output::print_error;

#[derive(Parser)]
#[command(name = "whalebridge")]
#[command(
    author,
    version,
    about = "Bridge a remote container engine socket to a local TCP endpoint"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "WHALEBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a bridge to a remote engine and hold it until Ctrl-C
    Connect {
        /// Engine address: [user@]host[:port], ssh://, tcp://, unix:// or npipe://
        target: String,
        /// Fixed port for the remote bridging helper
        #[arg(long)]
        remote_port: Option<u16>,
        /// Strategy to try, in order (repeatable; overrides config)
        #[arg(short, long = "strategy")]
        strategies: Vec<Method>,
        /// Retries after a transient failure
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Diagnose why a bridge to a host cannot be opened
    Check {
        /// Host to diagnose: [user@]host[:port] or ssh://
        target: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Connect {
            target,
            remote_port,
            strategies,
            retries,
        } => {
            let args = ConnectArgs {
                target,
                remote_port,
                strategies,
                retries,
            };
            commands::connect_command(&config_path, args).await?;
        }

        Commands::Check { target } => {
            commands::check_command(&config_path, &target).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config_path)?,
            ConfigAction::Get { key } => commands::config_get(&config_path, &key)?,
            ConfigAction::Set { key, value } => commands::config_set(&config_path, &key, &value)?,
            ConfigAction::Init { force } => commands::config_init(&config_path, force)?,
            ConfigAction::Path => commands::config_path(&config_path)?,
        },
    }

    Ok(())
}
