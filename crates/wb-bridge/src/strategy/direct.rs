//! Direct connection to the advertised endpoint

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use wb_core::config::BridgeConfig;
use wb_core::{BridgeError, EngineAddress, Method};

use super::{Connection, ConnectionStrategy};

/// Plain TCP to the engine's API port, or the local control socket
pub struct DirectStrategy {
    engine_port: u16,
    timeout: Duration,
}

impl DirectStrategy {
    pub fn new(engine_port: u16, timeout: Duration) -> Self {
        Self {
            engine_port,
            timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.engine_port, config.direct_timeout)
    }

    /// Endpoint string for an address this strategy handles
    pub fn endpoint(&self, address: &EngineAddress) -> Option<String> {
        match address {
            EngineAddress::Tcp { host, port } => Some(format!("tcp://{}:{}", host, port)),
            EngineAddress::Bare(target) => {
                Some(format!("tcp://{}:{}", target.host, self.engine_port))
            }
            EngineAddress::Unix { path } => Some(format!("unix://{}", path)),
            EngineAddress::Ssh(_) | EngineAddress::NamedPipe { .. } => None,
        }
    }

    async fn connect_tcp(&self, host: &str, port: u16, endpoint: &str) -> Result<(), BridgeError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| BridgeError::DirectConnect {
                endpoint: endpoint.to_string(),
                message: format!("connection timed out after {:?}", self.timeout),
            })?
            .map_err(|e| BridgeError::DirectConnect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        drop(stream);
        Ok(())
    }

    #[cfg(unix)]
    async fn connect_unix(&self, path: &str, endpoint: &str) -> Result<(), BridgeError> {
        let stream = tokio::time::timeout(self.timeout, tokio::net::UnixStream::connect(path))
            .await
            .map_err(|_| BridgeError::DirectConnect {
                endpoint: endpoint.to_string(),
                message: format!("connection timed out after {:?}", self.timeout),
            })?
            .map_err(|e| BridgeError::DirectConnect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        drop(stream);
        Ok(())
    }

    #[cfg(not(unix))]
    async fn connect_unix(&self, _path: &str, endpoint: &str) -> Result<(), BridgeError> {
        Err(BridgeError::DirectConnect {
            endpoint: endpoint.to_string(),
            message: "unix sockets are not supported on this platform".to_string(),
        })
    }
}

#[async_trait]
impl ConnectionStrategy for DirectStrategy {
    fn method(&self) -> Method {
        Method::Direct
    }

    fn skip_reason(&self, address: &EngineAddress) -> Option<String> {
        match address {
            EngineAddress::Ssh(_) => Some("ssh:// addresses are only reachable over SSH".into()),
            EngineAddress::NamedPipe { .. } => Some("named pipes need the named-pipe strategy".into()),
            EngineAddress::Unix { .. } if cfg!(not(unix)) => {
                Some("unix sockets are not supported on this platform".into())
            }
            _ => None,
        }
    }

    async fn connect(&self, address: &EngineAddress) -> Result<Connection, BridgeError> {
        let endpoint = self.endpoint(address).ok_or_else(|| BridgeError::DirectConnect {
            endpoint: address.to_string(),
            message: "not a directly reachable address".to_string(),
        })?;

        tracing::debug!("Trying direct connection to {}", endpoint);
        match address {
            EngineAddress::Tcp { host, port } => self.connect_tcp(host, *port, &endpoint).await?,
            EngineAddress::Bare(target) => {
                self.connect_tcp(&target.host, self.engine_port, &endpoint)
                    .await?
            }
            EngineAddress::Unix { path } => self.connect_unix(path, &endpoint).await?,
            EngineAddress::Ssh(_) | EngineAddress::NamedPipe { .. } => {}
        }

        tracing::info!("Direct connection to {} succeeded", endpoint);
        Ok(Connection::unmanaged(endpoint, Method::Direct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use wb_core::parse_engine_address;

    fn strategy() -> DirectStrategy {
        DirectStrategy::new(2375, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_connects_to_listening_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let address = parse_engine_address(&format!("tcp://127.0.0.1:{}", port)).unwrap();

        let connection = strategy().connect(&address).await.unwrap();

        assert_eq!(connection.method, Method::Direct);
        assert_eq!(connection.endpoint, format!("tcp://127.0.0.1:{}", port));
        assert!(connection.session.is_none());
    }

    #[tokio::test]
    async fn test_refused_is_direct_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let address = parse_engine_address(&format!("tcp://127.0.0.1:{}", port)).unwrap();

        let err = strategy().connect(&address).await.unwrap_err();
        assert!(matches!(err, BridgeError::DirectConnect { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_bare_host_uses_engine_port() {
        let address = parse_engine_address("alice@build-box:2222").unwrap();
        assert_eq!(
            strategy().endpoint(&address).unwrap(),
            "tcp://build-box:2375"
        );
    }

    #[test]
    fn test_skips_ssh_addresses() {
        let address = parse_engine_address("ssh://alice@remote").unwrap();
        assert!(strategy().skip_reason(&address).is_some());
        let address = parse_engine_address("tcp://remote").unwrap();
        assert!(strategy().skip_reason(&address).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.sock");
        let _listener = tokio::net::UnixListener::bind(&path).unwrap();
        let address = parse_engine_address(&format!("unix://{}", path.display())).unwrap();

        let connection = strategy().connect(&address).await.unwrap();
        assert!(connection.endpoint.starts_with("unix://"));
    }
}
