//! Target parsing
//!
//! Two input shapes are accepted:
//! - `[user@]host[:port]`, decoded into a [`ConnectionTarget`] for the SSH dial path
//! - engine URLs (`ssh://`, `tcp://`, `unix://`, `npipe://`), decoded into an
//!   [`EngineAddress`] that the orchestrator uses to pick strategies
//!
//! Parsing never guesses: an ambiguous field is a [`FormatError`].

use std::fmt;
use std::net::IpAddr;

use crate::error::FormatError;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default plain-TCP port of the engine API
pub const DEFAULT_ENGINE_PORT: u16 = 2375;

/// Default engine control socket
pub const DEFAULT_ENGINE_SOCKET: &str = "/var/run/docker.sock";

/// Where to dial the SSH server and as whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl ConnectionTarget {
    /// `host:port` suitable for socket address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Decoded engine address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAddress {
    /// `ssh://[user@]host[:port]`: reachable only through SSH
    Ssh(ConnectionTarget),
    /// `tcp://host[:port]`: the engine's plain-TCP API, with SSH to the same host as fallback
    Tcp { host: String, port: u16 },
    /// `unix:///path`: a local control socket
    Unix { path: String },
    /// `npipe:////./pipe/name`: a local Windows named pipe
    NamedPipe { path: String },
    /// `[user@]host[:port]` without a scheme; the port is the SSH port
    Bare(ConnectionTarget),
}

impl EngineAddress {
    /// The SSH target for tunnel and proxy-bridge strategies, if the address is remote
    pub fn ssh_target(&self) -> Option<ConnectionTarget> {
        match self {
            EngineAddress::Ssh(target) | EngineAddress::Bare(target) => Some(target.clone()),
            EngineAddress::Tcp { host, .. } => Some(ConnectionTarget {
                host: host.clone(),
                port: DEFAULT_SSH_PORT,
                user: current_username(),
            }),
            EngineAddress::Unix { .. } | EngineAddress::NamedPipe { .. } => None,
        }
    }

    /// Remote host name, or `localhost` for local sockets
    pub fn host(&self) -> &str {
        match self {
            EngineAddress::Ssh(target) | EngineAddress::Bare(target) => &target.host,
            EngineAddress::Tcp { host, .. } => host,
            EngineAddress::Unix { .. } | EngineAddress::NamedPipe { .. } => "localhost",
        }
    }

}

impl fmt::Display for EngineAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineAddress::Ssh(target) => write!(f, "ssh://{}", target),
            EngineAddress::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            EngineAddress::Unix { path } => write!(f, "unix://{}", path),
            EngineAddress::NamedPipe { path } => write!(f, "npipe://{}", path),
            EngineAddress::Bare(target) => write!(f, "{}", target),
        }
    }
}

/// Parse `[user@]host[:port]`
///
/// A missing user resolves to the current OS user; a missing port to 22.
pub fn parse_target(input: &str) -> Result<ConnectionTarget, FormatError> {
    parse_target_with_user(input, current_username)
}

/// Parse `[user@]host[:port]` with an explicit fallback for the user
pub fn parse_target_with_user(
    input: &str,
    default_user: impl FnOnce() -> String,
) -> Result<ConnectionTarget, FormatError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FormatError::Empty);
    }

    let (user, host_part) = match input.matches('@').count() {
        0 => (default_user(), input),
        1 => {
            let (user, rest) = input
                .split_once('@')
                .ok_or_else(|| FormatError::Malformed(input.to_string()))?;
            let user = user.trim();
            if user.is_empty() {
                return Err(FormatError::EmptyUser(input.to_string()));
            }
            (user.to_string(), rest.trim())
        }
        _ => return Err(FormatError::Malformed(input.to_string())),
    };

    if host_part.is_empty() {
        return Err(FormatError::EmptyHost(input.to_string()));
    }

    let (host, port) = split_host_port(host_part, input, DEFAULT_SSH_PORT)?;

    Ok(ConnectionTarget {
        host: host.to_string(),
        port,
        user,
    })
}

/// Parse a full engine address (URL with scheme, or bare target)
pub fn parse_engine_address(input: &str) -> Result<EngineAddress, FormatError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FormatError::Empty);
    }

    if let Some(rest) = input.strip_prefix("ssh://") {
        return parse_target(strip_path(rest)).map(EngineAddress::Ssh);
    }

    if let Some(rest) = input.strip_prefix("tcp://") {
        let authority = strip_path(rest).trim();
        if authority.is_empty() {
            return Err(FormatError::EmptyHost(input.to_string()));
        }
        if authority.contains('@') {
            return Err(FormatError::Malformed(input.to_string()));
        }
        let (host, port) = split_host_port(authority, input, DEFAULT_ENGINE_PORT)?;
        return Ok(EngineAddress::Tcp {
            host: host.to_string(),
            port,
        });
    }

    if let Some(path) = input.strip_prefix("unix://") {
        if path.is_empty() {
            return Err(FormatError::Malformed(input.to_string()));
        }
        return Ok(EngineAddress::Unix {
            path: path.to_string(),
        });
    }

    if let Some(path) = input.strip_prefix("npipe://") {
        if path.is_empty() {
            return Err(FormatError::Malformed(input.to_string()));
        }
        return Ok(EngineAddress::NamedPipe {
            path: path.to_string(),
        });
    }

    if input.contains("://") {
        return Err(FormatError::UnsupportedScheme(input.to_string()));
    }

    parse_target(input).map(EngineAddress::Bare)
}

/// Extract the bare host segment from an engine URL
///
/// `ssh://` keeps the `[user@]host[:port]` part without any path, `tcp://`
/// keeps everything after the scheme, `unix://` maps to `localhost`, and a
/// string without a scheme is returned unchanged.
pub fn extract_host(url: &str) -> Result<String, FormatError> {
    if url.is_empty() {
        return Err(FormatError::Empty);
    }
    if let Some(rest) = url.strip_prefix("ssh://") {
        return Ok(strip_path(rest).to_string());
    }
    if let Some(rest) = url.strip_prefix("tcp://") {
        return Ok(rest.to_string());
    }
    if url.starts_with("unix://") {
        return Ok("localhost".to_string());
    }
    Ok(url.to_string())
}

/// Validate host naming rules; IP literals always pass
pub fn validate_host(host: &str) -> Result<(), FormatError> {
    if host.is_empty() {
        return Err(FormatError::EmptyHost(host.to_string()));
    }
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if host.starts_with('.') || host.ends_with('.') {
        return Err(FormatError::EdgeDot(host.to_string()));
    }
    if host.contains("..") {
        return Err(FormatError::ConsecutiveDots(host.to_string()));
    }
    Ok(())
}

/// Current OS user with any `DOMAIN\` prefix removed
pub fn current_username() -> String {
    normalize_username(&whoami::username())
}

/// Reduce a domain-qualified `DOMAIN\user` to `user`
pub fn normalize_username(raw: &str) -> String {
    raw.rsplit('\\').next().unwrap_or(raw).to_string()
}

fn strip_path(rest: &str) -> &str {
    match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

fn split_host_port<'a>(
    host_part: &'a str,
    input: &str,
    default_port: u16,
) -> Result<(&'a str, u16), FormatError> {
    let (host, port) = match host_part.matches(':').count() {
        0 => (host_part.trim(), default_port),
        1 => {
            let (host, port) = host_part
                .split_once(':')
                .ok_or_else(|| FormatError::Malformed(input.to_string()))?;
            let host = host.trim();
            let port = port.trim();
            if host.is_empty() {
                return Err(FormatError::EmptyHost(input.to_string()));
            }
            if port.is_empty() {
                return Err(FormatError::EmptyPort(input.to_string()));
            }
            let parsed = port
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| FormatError::InvalidPort {
                    port: port.to_string(),
                    input: input.to_string(),
                })?;
            (host, parsed)
        }
        _ => return Err(FormatError::Malformed(input.to_string())),
    };

    validate_host(host)?;
    Ok((host, port))
}
