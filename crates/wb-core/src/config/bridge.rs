//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;
use crate::target::{DEFAULT_ENGINE_PORT, DEFAULT_ENGINE_SOCKET};
use crate::types::{Method, PortRange, DEFAULT_BRIDGE_PORT_RANGES};

/// Everything that tunes how a bridge is established and torn down
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Engine control socket on the remote host
    pub remote_socket: String,

    /// Bridging helper binary invoked on the remote host
    pub helper: String,

    /// Plain-TCP port the direct strategy dials for bare hosts
    pub engine_port: u16,

    /// Address the remote helper binds its listener to
    pub remote_bind_address: String,

    /// Remote directory for helper logs and pid files
    pub remote_log_dir: String,

    /// Candidate remote bridge ports
    pub remote_port_ranges: Vec<PortRange>,

    /// Candidate local forwarder ports
    pub local_port_ranges: Vec<PortRange>,

    /// Strategy order
    pub strategies: Vec<Method>,

    /// SSH dial timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Direct TCP connect timeout
    #[serde(with = "duration_secs")]
    pub direct_timeout: Duration,

    /// Upper bound on one strategy, dial to verified
    #[serde(with = "duration_secs")]
    pub strategy_timeout: Duration,

    /// Deadline for the remote helper to start listening
    #[serde(with = "duration_millis")]
    pub verify_timeout: Duration,

    /// Delay between liveness checks
    #[serde(with = "duration_millis")]
    pub verify_interval: Duration,

    /// Minimum time a live helper must survive when the listening check is off
    #[serde(with = "duration_millis")]
    pub verify_settle: Duration,

    /// Require the remote port to show up as listening before success
    pub verify_listening: bool,

    /// Wait between graceful and forced kill during teardown
    #[serde(with = "duration_millis")]
    pub kill_grace: Duration,

    /// Private keys to try, in order; `None` uses `~/.ssh/id_{rsa,ed25519,ecdsa}`
    pub key_paths: Option<Vec<PathBuf>>,

    /// known_hosts file; `None` uses `~/.ssh/known_hosts`
    pub known_hosts_path: Option<PathBuf>,

    /// Accept any host key. Trusted networks only.
    pub insecure_host_key: bool,

    /// Kill helpers left behind by abandoned bridges before launching
    pub reclaim_stale: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            remote_socket: DEFAULT_ENGINE_SOCKET.to_string(),
            helper: "socat".to_string(),
            engine_port: DEFAULT_ENGINE_PORT,
            remote_bind_address: "127.0.0.1".to_string(),
            remote_log_dir: "/tmp".to_string(),
            remote_port_ranges: DEFAULT_BRIDGE_PORT_RANGES.to_vec(),
            local_port_ranges: DEFAULT_BRIDGE_PORT_RANGES.to_vec(),
            strategies: vec![Method::Direct, Method::Tunnel, Method::ProxyBridge],
            connect_timeout: Duration::from_secs(30),
            direct_timeout: Duration::from_secs(5),
            strategy_timeout: Duration::from_secs(60),
            verify_timeout: Duration::from_secs(10),
            verify_interval: Duration::from_millis(250),
            verify_settle: Duration::from_millis(500),
            verify_listening: true,
            kill_grace: Duration::from_millis(500),
            key_paths: None,
            known_hosts_path: None,
            insecure_host_key: false,
            reclaim_stale: true,
        }
    }
}

impl BridgeConfig {
    /// Reject settings that would make every attempt fail in a confusing way
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one strategy must be enabled".to_string(),
            ));
        }
        for (i, method) in self.strategies.iter().enumerate() {
            if self.strategies[..i].contains(method) {
                return Err(ConfigError::Invalid(format!(
                    "strategy '{}' listed more than once",
                    method
                )));
            }
        }
        if self.remote_port_ranges.iter().all(|r| !r.is_valid()) {
            return Err(ConfigError::Invalid(
                "remote_port_ranges has no valid range".to_string(),
            ));
        }
        if self.local_port_ranges.iter().all(|r| !r.is_valid()) {
            return Err(ConfigError::Invalid(
                "local_port_ranges has no valid range".to_string(),
            ));
        }
        if self.verify_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "verify_interval must be greater than zero".to_string(),
            ));
        }
        if self.remote_socket.trim().is_empty() || self.helper.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "remote_socket and helper cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
