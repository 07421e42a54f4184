//! CLI command implementations

mod check;
mod config;
mod connect;

pub use check::check_command;
pub use config::{config_get, config_init, config_path, config_set, config_show};
pub use connect::{connect_command, ConnectArgs};
