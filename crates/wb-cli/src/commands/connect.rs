//! Connect command: open a bridge and hold it until interrupted

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use wb_bridge::{ConnectOptions, Connection, Orchestrator};
use wb_core::config::load_or_default;
use wb_core::retry::ExponentialBackoff;
use wb_core::{BridgeError, Method};

use crate::output::{format_connection, print_info, print_success, print_warning};

/// Options of `whalebridge connect`
#[derive(Debug, Clone, Default)]
pub struct ConnectArgs {
    pub target: String,
    pub remote_port: Option<u16>,
    pub strategies: Vec<Method>,
    pub retries: u32,
}

/// Open a bridge, print its endpoint, and tear it down on Ctrl-C
pub async fn connect_command(config_path: &Path, args: ConnectArgs) -> Result<()> {
    let config = load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let options = ConnectOptions {
        remote_port: args.remote_port,
        strategies: (!args.strategies.is_empty()).then(|| args.strategies.clone()),
    };
    let orchestrator = Orchestrator::from_config(Arc::new(config), options);

    let mut connection = connect_with_retries(&orchestrator, &args.target, args.retries)
        .await
        .with_context(|| format!("Could not connect to {}", args.target))?;

    print_success(&format!("Connected via {}", connection.method));
    println!("{}", format_connection(&connection));
    println!();
    println!("export DOCKER_HOST={}", connection.endpoint);
    println!();

    if connection.session.is_none() {
        // Nothing is held open for direct connections
        return Ok(());
    }

    print_info("Press Ctrl-C to close the bridge");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    print_info("Closing bridge...");
    match connection.close().await {
        Ok(()) => print_success("Bridge closed"),
        Err(e) => print_warning(&format!("Cleanup incomplete: {}", e)),
    }
    Ok(())
}

async fn connect_with_retries(
    orchestrator: &Orchestrator,
    target: &str,
    retries: u32,
) -> Result<Connection, BridgeError> {
    let mut backoff = ExponentialBackoff::new(
        Duration::from_secs(1),
        Duration::from_secs(30),
        2.0,
        0.25,
    );
    let mut attempt = 0;

    loop {
        match orchestrator.connect(target).await {
            Ok(connection) => return Ok(connection),
            Err(e) if attempt < retries && e.is_transient() => {
                attempt += 1;
                let delay = backoff.next_delay();
                tracing::warn!(
                    "Attempt {} failed with a transient error, retrying in {:?}: {}",
                    attempt,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
