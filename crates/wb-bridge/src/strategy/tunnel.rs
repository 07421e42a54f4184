//! SSH tunnel: each local connection gets its own remote socket relay

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wb_core::config::BridgeConfig;
use wb_core::{BridgeError, EngineAddress, Method};

use super::{remote_target, ssh_skip_reason, unwind, Connection, ConnectionStrategy};
use crate::ports::LocalPortAllocator;
use crate::remote::{commands, BridgeProvisioner};
use crate::session::{BridgeSession, Teardown, TeardownSettings};
use crate::ssh::{Dialer, ForwardTarget, LocalForwarder, SshDialer};

/// Engine API ping used to prove the relay path end to end
const PING_REQUEST: &[u8] = b"GET /_ping HTTP/1.0\r\nHost: whalebridge\r\n\r\n";

pub struct TunnelStrategy {
    config: Arc<BridgeConfig>,
    dialer: Arc<dyn Dialer>,
}

impl TunnelStrategy {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self {
            config,
            dialer: Arc::new(SshDialer),
        }
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }
}

#[async_trait]
impl ConnectionStrategy for TunnelStrategy {
    fn method(&self) -> Method {
        Method::Tunnel
    }

    fn skip_reason(&self, address: &EngineAddress) -> Option<String> {
        ssh_skip_reason(address, self.dialer.as_ref(), &self.config)
    }

    async fn connect(&self, address: &EngineAddress) -> Result<Connection, BridgeError> {
        let target = remote_target(address).map_err(BridgeError::Channel)?;
        let config = self.config.as_ref();
        let settings = TeardownSettings::from_config(config);

        let session = self.dialer.dial(&target, config).await?;
        let teardown = Teardown::new(settings.clone()).with_ssh(Arc::clone(&session));

        let provisioner = BridgeProvisioner::new(session.shell(), config);
        if let Err(e) = provisioner.check_helper().await {
            return Err(unwind(teardown, e).await);
        }
        if let Err(e) = provisioner.check_socket().await {
            return Err(unwind(teardown, e).await);
        }

        let listener = match LocalPortAllocator::new(config.local_port_ranges.clone())
            .bind()
            .await
        {
            Ok(listener) => listener,
            Err(e) => return Err(unwind(teardown, e).await),
        };

        let relay = ForwardTarget::Exec {
            command: commands::stdio_relay(&config.helper, &config.remote_socket),
        };
        let forwarder = match LocalForwarder::start(listener, Arc::clone(&session), relay) {
            Ok(forwarder) => forwarder,
            Err(e) => return Err(unwind(teardown, e).await),
        };

        let mut bridge = BridgeSession::tunnel(session, forwarder, settings);
        if let Err(e) = ping_through(bridge.local_port(), config.direct_timeout).await {
            if let Err(te) = bridge.close().await {
                tracing::warn!("Cleanup after failed tunnel ping was incomplete: {}", te);
            }
            return Err(e);
        }

        tracing::info!(
            "Tunnel to {} ready at {}",
            target,
            bridge.endpoint()
        );
        Ok(Connection::bridged(bridge))
    }
}

/// Send one ping through the local listener and expect an HTTP status line
async fn ping_through(local_port: u16, timeout: Duration) -> Result<(), BridgeError> {
    let exchange = async {
        let mut stream = TcpStream::connect(("127.0.0.1", local_port)).await?;
        stream.write_all(PING_REQUEST).await?;

        let mut buf = [0u8; 64];
        let mut read = 0;
        while read < 5 {
            let n = stream.read(&mut buf[read..]).await?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok::<_, std::io::Error>(buf[..read].to_vec())
    };

    let response = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| {
            BridgeError::Forwarding(format!("tunnel ping timed out after {:?}", timeout))
        })?
        .map_err(|e| BridgeError::Forwarding(format!("tunnel ping failed: {}", e)))?;

    if response.starts_with(b"HTTP/") {
        Ok(())
    } else {
        Err(BridgeError::Forwarding(format!(
            "tunnel ping got unexpected response {:?}",
            String::from_utf8_lossy(&response)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fail, ScriptedDialer, ScriptedShell};
    use tempfile::TempDir;
    use tokio::net::TcpListener;
    use wb_core::parse_engine_address;

    fn scripted(shell: Arc<ScriptedShell>) -> TunnelStrategy {
        TunnelStrategy::new(Arc::new(BridgeConfig::default()))
            .with_dialer(Arc::new(ScriptedDialer { shell }))
    }

    #[test]
    fn test_skips_local_addresses() {
        let strategy = scripted(Arc::new(ScriptedShell::new()));
        assert!(strategy
            .skip_reason(&parse_engine_address("unix:///var/run/docker.sock").unwrap())
            .is_some());
        assert!(strategy
            .skip_reason(&parse_engine_address("ssh://alice@remote").unwrap())
            .is_none());
        assert!(strategy
            .skip_reason(&parse_engine_address("tcp://remote:2375").unwrap())
            .is_none());
    }

    #[test]
    fn test_skips_without_credentials() {
        let dir = TempDir::new().unwrap();
        let config = BridgeConfig {
            key_paths: Some(vec![dir.path().join("id_ed25519")]),
            ..Default::default()
        };
        let strategy = TunnelStrategy::new(Arc::new(config));

        let reason = strategy
            .skip_reason(&parse_engine_address("ssh://alice@remote").unwrap())
            .unwrap();
        assert!(reason.contains("id_ed25519"), "{}", reason);
    }

    #[tokio::test]
    async fn test_connect_relays_through_exec_channel() {
        let shell = Arc::new(ScriptedShell::new().answering_streams(b"HTTP/1.0 200 OK\r\n\r\nOK"));
        let strategy = scripted(Arc::clone(&shell));

        let mut connection = strategy
            .connect(&parse_engine_address("alice@remote").unwrap())
            .await
            .unwrap();

        assert_eq!(connection.method, Method::Tunnel);
        assert!(connection.endpoint.starts_with("tcp://127.0.0.1:"));
        assert!(matches!(
            shell.streams().first(),
            Some(ForwardTarget::Exec { command }) if command.contains("UNIX-CONNECT:/var/run/docker.sock")
        ));

        connection.close().await.unwrap();
        assert!(shell.is_disconnected());
    }

    #[tokio::test]
    async fn test_missing_socket_disconnects() {
        let shell = Arc::new(ScriptedShell::new().on("test -S", vec![fail(1)]));
        let strategy = scripted(Arc::clone(&shell));

        let err = strategy
            .connect(&parse_engine_address("alice@remote").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::SocketAccess { .. }));
        assert!(shell.is_disconnected());
        assert!(shell.streams().is_empty());
    }

    #[tokio::test]
    async fn test_ping_accepts_http_status_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 128];
            let _ = stream.read(&mut buf).await;
            stream.write_all(b"HTTP/1.0 200 OK\r\n\r\nOK").await.unwrap();
        });

        ping_through(port, Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_rejects_closed_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let err = ping_through(port, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, BridgeError::Forwarding(_)));
    }
}
