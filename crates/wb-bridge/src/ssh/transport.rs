//! What the strategies need from an SSH connection
//!
//! Strategies dial through a [`Dialer`] and work against the returned
//! [`SshTransport`]: remote commands, one byte stream per forwarded local
//! connection, and an optional monitor channel.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::Msg;
use russh::Channel;
use tokio::io::{AsyncRead, AsyncWrite};

use wb_core::config::BridgeConfig;
use wb_core::traits::RemoteShell;
use wb_core::{BridgeError, ConnectionTarget};

use super::{ForwardTarget, SshSession};
use crate::auth::CredentialResolver;

pub trait RelayIo: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send + ?Sized> RelayIo for T {}

/// Byte stream carrying one forwarded connection
pub type RelayStream = Pin<Box<dyn RelayIo>>;

/// Session channel held open for the lifetime of a bridge
#[async_trait]
pub trait MonitorChannel: Send {
    async fn close(&mut self) -> Result<(), BridgeError>;
}

#[async_trait]
impl MonitorChannel for Channel<Msg> {
    async fn close(&mut self) -> Result<(), BridgeError> {
        Channel::<Msg>::close(self)
            .await
            .map_err(|e| BridgeError::Channel(format!("failed to close monitor channel: {}", e)))
    }
}

/// An authenticated connection as seen by the strategies
#[async_trait]
pub trait SshTransport: RemoteShell {
    /// This connection as a plain command runner
    fn shell(&self) -> &dyn RemoteShell;

    /// Open the remote end of one forwarded connection
    async fn open_stream(&self, target: &ForwardTarget) -> Result<RelayStream, BridgeError>;

    async fn open_monitor(&self) -> Result<Box<dyn MonitorChannel>, BridgeError>;
}

#[async_trait]
impl SshTransport for SshSession {
    fn shell(&self) -> &dyn RemoteShell {
        self
    }

    async fn open_stream(&self, target: &ForwardTarget) -> Result<RelayStream, BridgeError> {
        let channel = match target {
            ForwardTarget::DirectTcpip { host, port } => {
                self.open_direct_tcpip(host, *port).await?
            }
            ForwardTarget::Exec { command } => self.open_exec_channel(command).await?,
        };
        Ok(Box::pin(channel.into_stream()))
    }

    async fn open_monitor(&self) -> Result<Box<dyn MonitorChannel>, BridgeError> {
        Ok(Box::new(self.open_command_channel().await?))
    }
}

/// Opens authenticated connections for the remote strategies
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Fails when no connection could be authenticated at all
    fn check_credentials(&self, config: &BridgeConfig) -> Result<(), BridgeError>;

    async fn dial(
        &self,
        target: &ConnectionTarget,
        config: &BridgeConfig,
    ) -> Result<Arc<dyn SshTransport>, BridgeError>;
}

/// Public-key SSH with credentials from the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SshDialer;

#[async_trait]
impl Dialer for SshDialer {
    fn check_credentials(&self, config: &BridgeConfig) -> Result<(), BridgeError> {
        CredentialResolver::from_config(config).locate_key().map(|_| ())
    }

    async fn dial(
        &self,
        target: &ConnectionTarget,
        config: &BridgeConfig,
    ) -> Result<Arc<dyn SshTransport>, BridgeError> {
        let credentials = CredentialResolver::from_config(config).resolve()?;
        let session = SshSession::dial(target, &credentials, config.connect_timeout).await?;
        Ok(Arc::new(session))
    }
}
