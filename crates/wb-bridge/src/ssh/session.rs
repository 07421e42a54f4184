//! Authenticated SSH connection to the remote host

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;

use wb_core::traits::{CommandOutput, RemoteShell};
use wb_core::{BridgeError, ConnectionTarget};

use crate::auth::{Credentials, HostKeyPolicy};

/// Keepalive for long-held bridges
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// An authenticated SSH connection
///
/// There are no automatic retries at this layer; a failed dial is returned
/// to the caller as is.
pub struct SshSession {
    handle: Handle<ClientHandler>,
    target: ConnectionTarget,
}

impl SshSession {
    /// Resolve, connect and authenticate
    pub async fn dial(
        target: &ConnectionTarget,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let addrs = resolve(target).await?;

        let config = Arc::new(Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        });
        let handler = ClientHandler {
            host: target.host.clone(),
            port: target.port,
            policy: credentials.host_key_policy.clone(),
        };

        tracing::debug!("Connecting to {} ({:?})", target, addrs);
        let mut handle = tokio::time::timeout(
            timeout,
            client::connect(config, addrs.as_slice(), handler),
        )
        .await
        .map_err(|_| BridgeError::Dial {
            address: target.address(),
            message: format!("connection timed out after {:?}", timeout),
        })?
        .map_err(|e| BridgeError::Dial {
            address: target.address(),
            message: e.to_string(),
        })?;

        tracing::debug!("Authenticating as user '{}'", target.user);
        let authenticated = handle
            .authenticate_publickey(&target.user, Arc::clone(&credentials.key))
            .await
            .map_err(|e| BridgeError::Dial {
                address: target.address(),
                message: format!("authentication error: {}", e),
            })?;

        if !authenticated {
            return Err(BridgeError::AuthRejected {
                user: target.user.clone(),
            });
        }

        tracing::info!("SSH session established to {}", target);
        Ok(Self {
            handle,
            target: target.clone(),
        })
    }

    /// Open an independent session channel on this connection
    pub async fn open_command_channel(&self) -> Result<Channel<Msg>, BridgeError> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| BridgeError::Channel(format!("failed to open session channel: {}", e)))
    }

    /// Open a channel to `host:port` as seen from the remote side
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Channel<Msg>, BridgeError> {
        tracing::debug!("Opening direct-tcpip channel to {}:{}", host, port);
        self.handle
            .channel_open_direct_tcpip(host, port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| {
                BridgeError::Channel(format!(
                    "failed to open direct-tcpip channel to {}:{}: {}",
                    host, port, e
                ))
            })
    }

    /// Open a channel whose stdin/stdout are a remote command's
    pub async fn open_exec_channel(&self, command: &str) -> Result<Channel<Msg>, BridgeError> {
        let channel = self.open_command_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| BridgeError::Channel(format!("failed to execute '{}': {}", command, e)))?;
        Ok(channel)
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput, BridgeError> {
        tracing::debug!("Remote exec on {}: {}", self.target.host, command);
        let mut channel = self.open_exec_channel(command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        };
        tracing::debug!("Remote exit status: {:?}", output.exit_status);
        Ok(output)
    }

    async fn disconnect(&self) -> Result<(), BridgeError> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| BridgeError::Channel(format!("disconnect failed: {}", e)))
    }

    fn host(&self) -> &str {
        &self.target.host
    }
}

async fn resolve(target: &ConnectionTarget) -> Result<Vec<SocketAddr>, BridgeError> {
    if let Ok(ip) = target.host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, target.port)]);
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|e| BridgeError::HostResolution {
            host: target.host.clone(),
            message: e.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(BridgeError::HostResolution {
            host: target.host.clone(),
            message: "no addresses returned".to_string(),
        });
    }
    Ok(addrs)
}

/// russh client callbacks; only host-key checking is customised
pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Server host key: {}", fingerprint);

        match &self.policy {
            HostKeyPolicy::InsecureAccept => Ok(true),
            HostKeyPolicy::Strict { known_hosts } => {
                match russh_keys::check_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    known_hosts,
                ) {
                    Ok(true) => {
                        tracing::debug!("Host key verified against {:?}", known_hosts);
                        Ok(true)
                    }
                    Ok(false) => {
                        tracing::warn!("Host key for {} is not in {:?}", self.host, known_hosts);
                        Err(anyhow::anyhow!(
                            "host key for {} ({}) not found in {}",
                            self.host,
                            fingerprint,
                            known_hosts.display()
                        ))
                    }
                    Err(e) => {
                        tracing::error!("Host key for {} does not match known_hosts", self.host);
                        Err(anyhow::anyhow!(
                            "host key verification failed for {}: {}",
                            self.host,
                            e
                        ))
                    }
                }
            }
        }
    }
}
