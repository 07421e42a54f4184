//! SSH plus a detached remote helper bridging TCP to the control socket

use std::sync::Arc;

use async_trait::async_trait;

use wb_core::config::BridgeConfig;
use wb_core::{BridgeError, EngineAddress, Method};

use super::{remote_target, ssh_skip_reason, unwind, Connection, ConnectionStrategy};
use crate::ports::LocalPortAllocator;
use crate::remote::{BridgeProvisioner, BridgeVerifier};
use crate::session::{BridgeSession, Teardown, TeardownSettings};
use crate::ssh::{Dialer, ForwardTarget, LocalForwarder, SshDialer};

pub struct ProxyBridgeStrategy {
    config: Arc<BridgeConfig>,
    dialer: Arc<dyn Dialer>,
    remote_port: Option<u16>,
}

impl ProxyBridgeStrategy {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self {
            config,
            dialer: Arc::new(SshDialer),
            remote_port: None,
        }
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Use this remote port instead of searching the configured ranges
    pub fn with_remote_port(mut self, port: Option<u16>) -> Self {
        self.remote_port = port;
        self
    }
}

#[async_trait]
impl ConnectionStrategy for ProxyBridgeStrategy {
    fn method(&self) -> Method {
        Method::ProxyBridge
    }

    fn skip_reason(&self, address: &EngineAddress) -> Option<String> {
        ssh_skip_reason(address, self.dialer.as_ref(), &self.config)
    }

    async fn connect(&self, address: &EngineAddress) -> Result<Connection, BridgeError> {
        let target = remote_target(address).map_err(BridgeError::Channel)?;
        let config = self.config.as_ref();
        let settings = TeardownSettings::from_config(config);

        let session = self.dialer.dial(&target, config).await?;
        let mut teardown = Teardown::new(settings.clone()).with_ssh(Arc::clone(&session));

        let remote = match BridgeProvisioner::new(session.shell(), config)
            .provision(self.remote_port)
            .await
        {
            Ok(remote) => remote,
            Err(e) => return Err(unwind(teardown, e).await),
        };
        teardown = teardown.with_remote(remote.remote_port, Some(remote.remote_pid));

        if let Err(e) = BridgeVerifier::new(session.shell(), config)
            .verify(remote.remote_port, remote.remote_pid)
            .await
        {
            return Err(unwind(teardown, e).await);
        }

        let listener = match LocalPortAllocator::new(config.local_port_ranges.clone())
            .bind()
            .await
        {
            Ok(listener) => listener,
            Err(e) => return Err(unwind(teardown, e).await),
        };

        let forward = ForwardTarget::DirectTcpip {
            host: forward_host(&config.remote_bind_address),
            port: remote.remote_port,
        };
        let forwarder = match LocalForwarder::start(listener, Arc::clone(&session), forward) {
            Ok(forwarder) => forwarder,
            Err(e) => return Err(unwind(teardown, e).await),
        };

        let monitor = match session.open_monitor().await {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::debug!("No monitor channel: {}", e);
                None
            }
        };

        let bridge = BridgeSession::proxy_bridge(session, forwarder, monitor, remote, settings);
        tracing::info!(
            "Proxy bridge to {} ready at {} (remote port {}, pid {})",
            target,
            bridge.endpoint(),
            remote.remote_port,
            remote.remote_pid
        );
        Ok(Connection::bridged(bridge))
    }
}

/// Address to dial on the remote side for a helper bound to `bind_address`
fn forward_host(bind_address: &str) -> String {
    match bind_address {
        "0.0.0.0" | "" => "127.0.0.1".to_string(),
        "::" => "::1".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fail, ok, ScriptedDialer, ScriptedShell};
    use tempfile::TempDir;
    use wb_core::{parse_engine_address, PortRange, RemotePid};

    fn scripted(shell: Arc<ScriptedShell>) -> ProxyBridgeStrategy {
        let config = BridgeConfig {
            remote_port_ranges: vec![PortRange::new(2376, 2377)],
            ..Default::default()
        };
        ProxyBridgeStrategy::new(Arc::new(config)).with_dialer(Arc::new(ScriptedDialer { shell }))
    }

    fn remote() -> EngineAddress {
        parse_engine_address("alice@remote").unwrap()
    }

    #[test]
    fn test_forward_host_for_wildcard_binds() {
        assert_eq!(forward_host("0.0.0.0"), "127.0.0.1");
        assert_eq!(forward_host("::"), "::1");
        assert_eq!(forward_host("10.0.0.5"), "10.0.0.5");
    }

    #[test]
    fn test_applies_to_remote_addresses_only() {
        let strategy = scripted(Arc::new(ScriptedShell::new()));
        assert!(strategy
            .skip_reason(&parse_engine_address("alice@remote").unwrap())
            .is_none());
        assert!(strategy
            .skip_reason(&parse_engine_address("npipe:////./pipe/docker_engine").unwrap())
            .is_some());
    }

    #[test]
    fn test_skips_without_credentials() {
        let dir = TempDir::new().unwrap();
        let config = BridgeConfig {
            key_paths: Some(vec![dir.path().join("id_rsa")]),
            ..Default::default()
        };
        let strategy = ProxyBridgeStrategy::new(Arc::new(config));

        assert!(strategy.skip_reason(&remote()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_close_twice() {
        let shell = Arc::new(
            ScriptedShell::new()
                .on("grep -q ':2376 '", vec![fail(1), fail(1), ok("")])
                .on("nohup", vec![ok("4242\n")]),
        );
        let strategy = scripted(Arc::clone(&shell));

        let mut connection = strategy.connect(&remote()).await.unwrap();
        assert_eq!(connection.method, Method::ProxyBridge);
        assert!(connection.endpoint.starts_with("tcp://127.0.0.1:"));
        let session = connection.session.as_ref().unwrap();
        assert_eq!(session.remote_port(), Some(2376));
        assert_eq!(session.remote_pid(), Some(RemotePid(4242)));

        connection.close().await.unwrap();
        assert!(shell.ran("kill 4242 2>/dev/null; pkill -f"));
        assert!(shell.ran("kill -9 4242"));
        assert!(shell.ran("rm -f /tmp/whalebridge-2376.pid"));
        assert!(shell.is_monitor_closed());
        assert!(shell.is_disconnected());

        let commands_after_first = shell.commands().len();
        connection.close().await.unwrap();
        assert_eq!(shell.commands().len(), commands_after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_verification_kills_helper_and_disconnects() {
        let shell = Arc::new(
            ScriptedShell::new()
                .on("grep -q ':2376 '", vec![fail(1)])
                .on("nohup", vec![ok("4242\n")])
                .on("kill -0 4242", vec![fail(1)]),
        );
        let strategy = scripted(Arc::clone(&shell));

        let err = strategy.connect(&remote()).await.unwrap_err();

        assert!(matches!(err, BridgeError::VerificationTimeout { .. }));
        assert!(shell.ran("kill 4242 2>/dev/null; pkill -f '[s]ocat TCP-LISTEN:2376,'"));
        assert!(shell.ran("rm -f /tmp/whalebridge-2376.pid"));
        assert!(!shell.is_monitor_closed());
        assert!(shell.is_disconnected());
        assert!(shell.streams().is_empty());
    }
}
