//! Local port allocation
//!
//! Ports are found by binding and immediately releasing a listener on the
//! loopback interface. Nothing is reserved: another process can take the
//! port between the check and its use, which callers must tolerate.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use tokio::net::TcpListener;

use wb_core::types::{describe_ranges, PortRange};
use wb_core::BridgeError;

/// Finds free loopback ports within configured ranges
#[derive(Debug, Clone)]
pub struct LocalPortAllocator {
    ranges: Vec<PortRange>,
}

impl LocalPortAllocator {
    pub fn new(ranges: Vec<PortRange>) -> Self {
        Self { ranges }
    }

    fn candidates(&self) -> impl Iterator<Item = u16> + '_ {
        self.ranges
            .iter()
            .filter(|range| range.is_valid())
            .flat_map(|range| range.ports())
    }

    fn exhausted(&self) -> BridgeError {
        BridgeError::PortExhaustion {
            ranges: describe_ranges(&self.ranges),
        }
    }

    /// First port in range order that can currently be bound
    pub fn allocate(&self) -> Result<u16, BridgeError> {
        for port in self.candidates() {
            if port_is_free(port) {
                tracing::debug!("Allocated local port {}", port);
                return Ok(port);
            }
        }
        Err(self.exhausted())
    }

    /// Bind the first free port and keep the listener
    pub async fn bind(&self) -> Result<TcpListener, BridgeError> {
        for port in self.candidates() {
            match TcpListener::bind(loopback(port)).await {
                Ok(listener) => {
                    tracing::debug!("Bound local port {}", port);
                    return Ok(listener);
                }
                Err(e) => tracing::trace!("Local port {} unavailable: {}", port, e),
            }
        }
        Err(self.exhausted())
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Bind-and-release check on 127.0.0.1
pub fn port_is_free(port: u16) -> bool {
    StdTcpListener::bind(loopback(port)).is_ok()
}
