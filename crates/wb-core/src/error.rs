//! Core error types for whalebridge

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::{Method, RemotePid};

/// Malformed target strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Nothing to parse
    #[error("target cannot be empty")]
    Empty,

    /// More than one `@` or `:` where exactly one is allowed
    #[error("invalid target format '{0}': expected [user@]host[:port]")]
    Malformed(String),

    /// `@host` with nothing before the `@`
    #[error("username cannot be empty in '{0}'")]
    EmptyUser(String),

    /// Host segment missing
    #[error("hostname cannot be empty in '{0}'")]
    EmptyHost(String),

    /// `host:` with nothing after the `:`
    #[error("port cannot be empty in '{0}'")]
    EmptyPort(String),

    /// Port is not a number in 1..=65535
    #[error("invalid port '{port}' in '{input}': port must be numeric (1-65535)")]
    InvalidPort { port: String, input: String },

    /// Host begins or ends with `.`
    #[error("hostname '{0}' cannot start or end with a dot")]
    EdgeDot(String),

    /// Host contains `..`
    #[error("hostname '{0}' cannot contain consecutive dots")]
    ConsecutiveDots(String),

    /// Scheme other than ssh, tcp, unix or npipe
    #[error("unsupported scheme in '{0}'")]
    UnsupportedScheme(String),
}

/// Errors raised while establishing, verifying or tearing down a bridge
///
/// Each variant names the stage that produced it so that the composite
/// error of a failed connection attempt tells the operator which layer
/// rejected the connection.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Target string could not be parsed
    #[error("invalid target: {0}")]
    Format(#[from] FormatError),

    /// Hostname did not resolve
    #[error("cannot resolve hostname '{host}': {message}")]
    HostResolution { host: String, message: String },

    /// None of the default key files exist
    #[error("no SSH private key found (checked: {})", display_paths(.searched))]
    NoKeyFound { searched: Vec<PathBuf> },

    /// Key file is readable by group or others
    #[error("SSH key {path:?} has overly permissive permissions {mode:o} (should be 600)")]
    KeyPermission { path: PathBuf, mode: u32 },

    /// Key file exists but could not be decoded
    #[error("failed to load SSH key {path:?}: {message}")]
    KeyLoad { path: PathBuf, message: String },

    /// Transport connection could not be established
    #[error("failed to connect to SSH server {address}: {message}")]
    Dial { address: String, message: String },

    /// Server refused the public key
    #[error("authentication rejected for user '{user}'")]
    AuthRejected { user: String },

    /// A command channel could not be opened or failed mid-command
    #[error("SSH channel error: {0}")]
    Channel(String),

    /// Bridging helper binary missing on the remote host
    #[error("bridging helper '{helper}' not available on remote host")]
    HelperUnavailable { helper: String },

    /// Control socket missing or unreadable on the remote host
    #[error("control socket not accessible at {socket}")]
    SocketAccess { socket: String },

    /// Every candidate port is taken
    #[error("no available ports found in ranges {ranges}")]
    PortExhaustion { ranges: String },

    /// Launch command failed or did not report a process id
    #[error("failed to launch bridging helper: {0}")]
    LaunchFailed(String),

    /// Launched helper died or never started listening
    #[error("bridge process {pid} did not become ready: {message}")]
    VerificationTimeout { pid: RemotePid, message: String },

    /// Direct connection to the advertised endpoint failed
    #[error("direct connection to {endpoint} failed: {message}")]
    DirectConnect { endpoint: String, message: String },

    /// Local listener or forwarding path failed
    #[error("local forwarding failed: {0}")]
    Forwarding(String),

    /// A strategy exceeded its own time budget
    #[error("{method} strategy timed out after {after:?}")]
    Timeout { method: Method, after: Duration },

    /// One or more teardown steps failed; never fatal
    #[error("teardown incomplete: {}", .0.join("; "))]
    Teardown(Vec<String>),

    /// Composite error listing every attempted strategy
    #[error("all connection strategies failed:\n{0}")]
    AllStrategiesFailed(StrategyFailures),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether a caller-level retry is worthwhile.
    ///
    /// This is a substring heuristic over the rendered message. A composite
    /// failure is judged by the last strategy that was attempted.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::AllStrategiesFailed(outcome) => outcome
                .failures
                .last()
                .is_some_and(|last| last.error.is_transient()),
            other => crate::retry::is_transient_message(&other.to_string()),
        }
    }
}

/// Terminal error of one attempted strategy
#[derive(Debug)]
pub struct StrategyFailure {
    pub method: Method,
    pub error: BridgeError,
}

/// Every failure and skip recorded during one orchestrator run
#[derive(Debug, Default)]
pub struct StrategyFailures {
    pub failures: Vec<StrategyFailure>,
    pub skipped: Vec<(Method, String)>,
}

impl StrategyFailures {
    /// Methods that were attempted and failed, in order
    pub fn methods(&self) -> Vec<Method> {
        self.failures.iter().map(|f| f.method).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for StrategyFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() && self.skipped.is_empty() {
            return write!(f, "  (no strategy was applicable)");
        }
        let mut first = true;
        for failure in &self.failures {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "  - {}: {}", failure.method, failure.error)?;
        }
        for (method, reason) in &self.skipped {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "  - {} (skipped): {}", method, reason)?;
        }
        Ok(())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
