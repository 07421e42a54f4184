//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a connection to the engine was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Plain TCP or local socket connection to the advertised endpoint
    Direct,
    /// SSH session relaying each local connection to the remote socket
    Tunnel,
    /// SSH session plus a detached remote TCP-to-socket helper
    ProxyBridge,
    /// Windows named pipe of a local engine
    NamedPipe,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Direct => "direct",
            Method::Tunnel => "tunnel",
            Method::ProxyBridge => "proxy-bridge",
            Method::NamedPipe => "named-pipe",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Method::Direct),
            "tunnel" => Ok(Method::Tunnel),
            "proxy-bridge" | "proxy" | "bridge" => Ok(Method::ProxyBridge),
            "named-pipe" | "npipe" => Ok(Method::NamedPipe),
            other => Err(format!("unknown connection method '{}'", other)),
        }
    }
}

/// Inclusive range of TCP ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Ranges with a zero bound or `start > end` are ignored by allocators
    pub fn is_valid(&self) -> bool {
        self.start > 0 && self.end > 0 && self.start <= self.end
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Candidate ranges for bridge ports. 2375 is the engine's own plain-TCP
/// port and is left out.
pub const DEFAULT_BRIDGE_PORT_RANGES: [PortRange; 3] = [
    PortRange::new(2376, 2385),
    PortRange::new(2386, 2395),
    PortRange::new(2396, 2405),
];

/// Render ranges the way error messages list them
pub fn describe_ranges(ranges: &[PortRange]) -> String {
    ranges
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Process id of a detached helper on the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePid(pub u32);

impl RemotePid {
    /// Parse the output of `... & echo $!`, taking the last numeric line
    pub fn from_output(output: &str) -> Option<Self> {
        output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .and_then(|line| line.parse::<u32>().ok())
            .filter(|pid| *pid > 0)
            .map(RemotePid)
    }
}

impl fmt::Display for RemotePid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
