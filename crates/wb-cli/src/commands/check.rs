//! Check command: run the connection diagnostics against a host

use std::path::Path;

use anyhow::{Context, Result};

use wb_bridge::diagnostics::{all_passed, diagnose};
use wb_core::config::load_or_default;
use wb_core::parse_engine_address;

use crate::output::{failed_checks, format_checks, print_info, print_success};

/// Diagnose `target`, printing every stage; fails if any stage failed
pub async fn check_command(config_path: &Path, target: &str) -> Result<()> {
    let config = load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let address = parse_engine_address(target)
        .with_context(|| format!("Invalid target {:?}", target))?;
    let Some(ssh_target) = address.ssh_target() else {
        anyhow::bail!("{} is a local engine address; there is nothing to diagnose over SSH", address);
    };

    print_info(&format!("Diagnosing {}", ssh_target));
    let results = diagnose(&ssh_target, &config).await;
    println!("{}", format_checks(&results));

    if all_passed(&results) {
        print_success("All checks passed");
        return Ok(());
    }

    anyhow::bail!(
        "SSH connection diagnostics failed:\n{}",
        failed_checks(&results).join("\n")
    )
}
