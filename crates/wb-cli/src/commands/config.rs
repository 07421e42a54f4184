//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use wb_core::config::{self, BridgeConfig};

/// Print the configuration file path
pub fn config_path(config_path: &Path) -> Result<()> {
    println!("{}", config_path.display());
    Ok(())
}

/// Show the effective configuration
pub fn config_show(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        print_info(&format!("Configuration file: {:?}", config_path));
    } else {
        print_warning(&format!(
            "No configuration file at {:?}; showing defaults",
            config_path
        ));
        print_info("Run 'whalebridge config init' to create one");
    }
    println!();

    let config = config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Get one value of the effective configuration
pub fn config_get(config_path: &Path, key: &str) -> Result<()> {
    let config = config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let root = toml::Value::try_from(&config).context("Failed to render configuration")?;

    let mut current = &root;
    for part in key.split('.') {
        match current.as_table().and_then(|t| t.get(part)) {
            Some(value) => current = value,
            None => {
                print_error(&format!("Key not found: {}", key));
                anyhow::bail!("Unknown configuration key: {}", key);
            }
        }
    }

    match current {
        toml::Value::String(s) => println!("{}", s),
        toml::Value::Table(_) => println!("{}", toml::to_string_pretty(current)?),
        other => println!("{}", other),
    }
    Ok(())
}

/// Set one value, rejecting results that no longer form a valid configuration
pub fn config_set(config_path: &Path, key: &str, value: &str) -> Result<()> {
    let mut table = if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        toml::from_str::<toml::Table>(&content).context("Failed to parse config file")?
    } else {
        print_info("Creating default configuration...");
        match toml::Value::try_from(BridgeConfig::default())
            .context("Failed to render default configuration")?
        {
            toml::Value::Table(table) => table,
            _ => anyhow::bail!("Default configuration is not a table"),
        }
    };

    let parts: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        anyhow::bail!("Invalid key: {}", key);
    };

    let mut current = &mut table;
    for part in parents {
        current = current
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Cannot navigate to key: {}", key))?;
    }
    current.insert(last.to_string(), parse_value(value));

    let updated: BridgeConfig = toml::Value::Table(table)
        .try_into()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    updated
        .validate()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;

    config::save_config(config_path, &updated)
        .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

    print_success(&format!("Set {} = {}", key, value));
    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", config_path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(config_path, &BridgeConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

    print_success(&format!("Created configuration file: {:?}", config_path));
    Ok(())
}

/// Interpret a command-line value as TOML, falling back to a plain string
fn parse_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}
