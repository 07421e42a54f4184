//! Connection strategies
//!
//! Each strategy is one way of reaching the engine. The orchestrator tries
//! them in order and keeps the first that succeeds.

mod direct;
mod named_pipe;
mod proxy;
mod tunnel;

pub use direct::DirectStrategy;
#[cfg(windows)]
pub use named_pipe::NamedPipeStrategy;
pub use named_pipe::{pipe_path_to_windows, KNOWN_ENGINE_PIPES};
pub use proxy::ProxyBridgeStrategy;
pub use tunnel::TunnelStrategy;

use async_trait::async_trait;
use wb_core::config::BridgeConfig;
use wb_core::{BridgeError, ConnectionTarget, EngineAddress, Method};

use crate::session::{BridgeSession, Teardown};
use crate::ssh::Dialer;

/// One way of reaching the engine
#[async_trait]
pub trait ConnectionStrategy: Send + Sync {
    fn method(&self) -> Method;

    /// Why this strategy cannot handle `address`, if it cannot
    fn skip_reason(&self, address: &EngineAddress) -> Option<String>;

    /// Establish a connection, cleaning up anything partially built on failure
    async fn connect(&self, address: &EngineAddress) -> Result<Connection, BridgeError>;
}

/// A working path to the engine
#[derive(Debug)]
pub struct Connection {
    /// Address a control-API client should use
    pub endpoint: String,
    pub method: Method,
    /// Present for strategies that own an SSH session
    pub session: Option<BridgeSession>,
}

impl Connection {
    /// Connection that holds no resources
    pub fn unmanaged(endpoint: impl Into<String>, method: Method) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            session: None,
        }
    }

    pub fn bridged(session: BridgeSession) -> Self {
        Self {
            endpoint: session.endpoint(),
            method: session.method(),
            session: Some(session),
        }
    }

    /// Tear down the owned bridge, if any
    pub async fn close(&mut self) -> Result<(), BridgeError> {
        match self.session.as_mut() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

/// SSH target for remote strategies, or the reason there is none
pub(crate) fn remote_target(address: &EngineAddress) -> Result<ConnectionTarget, String> {
    address
        .ssh_target()
        .ok_or_else(|| format!("{} is a local engine address", address))
}

/// Why an SSH strategy cannot run against `address`: a local address, or
/// no usable credentials
pub(crate) fn ssh_skip_reason(
    address: &EngineAddress,
    dialer: &dyn Dialer,
    config: &BridgeConfig,
) -> Option<String> {
    if let Err(reason) = remote_target(address) {
        return Some(reason);
    }
    dialer.check_credentials(config).err().map(|e| e.to_string())
}

/// Release what a failed strategy built and hand back its error
pub(crate) async fn unwind(mut teardown: Teardown, error: BridgeError) -> BridgeError {
    if let Err(e) = teardown.run().await {
        tracing::warn!("Cleanup after failed attempt was incomplete: {}", e);
    }
    error
}
