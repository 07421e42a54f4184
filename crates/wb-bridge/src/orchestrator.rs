//! Ordered fallback across connection strategies
//!
//! Strategies run strictly one after another, each under its own timeout.
//! The first success wins; if none succeeds the caller gets one error that
//! lists every attempted strategy's failure and every skipped strategy.

use std::sync::Arc;
use std::time::Duration;

use wb_core::config::BridgeConfig;
use wb_core::error::{StrategyFailure, StrategyFailures};
use wb_core::{parse_engine_address, BridgeError, EngineAddress, Method};

use crate::strategy::{
    Connection, ConnectionStrategy, DirectStrategy, ProxyBridgeStrategy, TunnelStrategy,
};

/// Per-call overrides of the configured behaviour
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Fixed remote bridge port for the proxy-bridge strategy
    pub remote_port: Option<u16>,
    /// Strategy order replacing the configured one
    pub strategies: Option<Vec<Method>>,
}

pub struct Orchestrator {
    strategies: Vec<Box<dyn ConnectionStrategy>>,
    strategy_timeout: Duration,
}

impl Orchestrator {
    pub fn new(strategies: Vec<Box<dyn ConnectionStrategy>>, strategy_timeout: Duration) -> Self {
        Self {
            strategies,
            strategy_timeout,
        }
    }

    /// Build the strategy list from configuration
    pub fn from_config(config: Arc<BridgeConfig>, options: ConnectOptions) -> Self {
        let order = options
            .strategies
            .clone()
            .unwrap_or_else(|| config.strategies.clone());

        let mut strategies: Vec<Box<dyn ConnectionStrategy>> = Vec::new();
        for method in order {
            match method {
                Method::Direct => strategies.push(Box::new(DirectStrategy::from_config(&config))),
                Method::Tunnel => {
                    strategies.push(Box::new(TunnelStrategy::new(Arc::clone(&config))))
                }
                Method::ProxyBridge => strategies.push(Box::new(
                    ProxyBridgeStrategy::new(Arc::clone(&config))
                        .with_remote_port(options.remote_port),
                )),
                Method::NamedPipe => {
                    #[cfg(windows)]
                    strategies.push(Box::new(crate::strategy::NamedPipeStrategy::new(
                        config.direct_timeout,
                    )));
                    #[cfg(not(windows))]
                    tracing::warn!("Named pipe strategy is only available on Windows; ignoring");
                }
            }
        }

        #[cfg(windows)]
        {
            if !strategies.iter().any(|s| s.method() == Method::NamedPipe) {
                strategies.insert(
                    0,
                    Box::new(crate::strategy::NamedPipeStrategy::new(config.direct_timeout)),
                );
            }
        }

        Self::new(strategies, config.strategy_timeout)
    }

    /// Strategy order
    pub fn methods(&self) -> Vec<Method> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// Parse `target` and connect
    pub async fn connect(&self, target: &str) -> Result<Connection, BridgeError> {
        let address = parse_engine_address(target)?;
        self.connect_address(&address).await
    }

    /// Try each strategy in order until one succeeds
    pub async fn connect_address(&self, address: &EngineAddress) -> Result<Connection, BridgeError> {
        let mut outcome = StrategyFailures::default();

        for strategy in &self.strategies {
            let method = strategy.method();

            if let Some(reason) = strategy.skip_reason(address) {
                tracing::debug!("Skipping {} strategy: {}", method, reason);
                outcome.skipped.push((method, reason));
                continue;
            }

            tracing::info!("Trying {} strategy for {}", method, address);
            let attempt = tokio::time::timeout(self.strategy_timeout, strategy.connect(address));
            let error = match attempt.await {
                Ok(Ok(connection)) => {
                    tracing::info!("Connected via {}: {}", method, connection.endpoint);
                    return Ok(connection);
                }
                Ok(Err(e)) => e,
                Err(_) => BridgeError::Timeout {
                    method,
                    after: self.strategy_timeout,
                },
            };

            tracing::warn!("{} strategy failed: {}", method, error);
            outcome.failures.push(StrategyFailure { method, error });
        }

        Err(BridgeError::AllStrategiesFailed(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_order() {
        let orchestrator =
            Orchestrator::from_config(Arc::new(BridgeConfig::default()), ConnectOptions::default());
        let methods = orchestrator.methods();
        let remote: Vec<_> = methods
            .into_iter()
            .filter(|m| *m != Method::NamedPipe)
            .collect();
        assert_eq!(
            remote,
            vec![Method::Direct, Method::Tunnel, Method::ProxyBridge]
        );
    }

    #[test]
    fn test_override_order() {
        let options = ConnectOptions {
            remote_port: Some(2390),
            strategies: Some(vec![Method::ProxyBridge, Method::Direct]),
        };
        let orchestrator = Orchestrator::from_config(Arc::new(BridgeConfig::default()), options);
        let remote: Vec<_> = orchestrator
            .methods()
            .into_iter()
            .filter(|m| *m != Method::NamedPipe)
            .collect();
        assert_eq!(remote, vec![Method::ProxyBridge, Method::Direct]);
    }

    #[tokio::test]
    async fn test_malformed_target_is_format_error() {
        let orchestrator =
            Orchestrator::from_config(Arc::new(BridgeConfig::default()), ConnectOptions::default());
        let err = orchestrator.connect(".bad..host").await.unwrap_err();
        assert!(matches!(err, BridgeError::Format(_)));
    }

    #[tokio::test]
    async fn test_ssh_strategies_skipped_without_credentials() {
        let dir = TempDir::new().unwrap();
        let config = BridgeConfig {
            key_paths: Some(vec![dir.path().join("id_rsa")]),
            ..Default::default()
        };
        let options = ConnectOptions {
            remote_port: None,
            strategies: Some(vec![Method::Tunnel, Method::ProxyBridge]),
        };
        let orchestrator = Orchestrator::from_config(Arc::new(config), options);

        match orchestrator.connect("ssh://alice@127.0.0.1:1").await {
            Err(BridgeError::AllStrategiesFailed(outcome)) => {
                assert!(outcome.failures.is_empty());
                let ssh: Vec<_> = outcome
                    .skipped
                    .iter()
                    .filter(|(m, _)| *m != Method::NamedPipe)
                    .collect();
                let methods: Vec<_> = ssh.iter().map(|(m, _)| *m).collect();
                assert_eq!(methods, vec![Method::Tunnel, Method::ProxyBridge]);
                assert!(ssh.iter().all(|(_, reason)| reason.contains("no SSH private key")));
            }
            other => panic!("expected AllStrategiesFailed, got {:?}", other),
        }
    }
}
