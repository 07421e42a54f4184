//! Local engine over a Windows named pipe

/// Pipes a local Docker Desktop installation may expose, most likely first
pub const KNOWN_ENGINE_PIPES: &[&str] = &[
    "//./pipe/dockerDesktopLinuxEngine",
    "//./pipe/docker_engine",
    "//./pipe/dockerDesktopEngine",
];

/// `//./pipe/name` to `\\.\pipe\name`
pub fn pipe_path_to_windows(path: &str) -> String {
    path.replace('/', "\\")
}

#[cfg(windows)]
pub use imp::NamedPipeStrategy;

#[cfg(windows)]
mod imp {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::windows::named_pipe::ClientOptions;

    use wb_core::{BridgeError, EngineAddress, Method};

    use super::{pipe_path_to_windows, KNOWN_ENGINE_PIPES};
    use crate::strategy::{Connection, ConnectionStrategy};

    /// Opens the requested pipe, then the well-known engine pipes
    pub struct NamedPipeStrategy {
        timeout: Duration,
    }

    impl NamedPipeStrategy {
        pub fn new(timeout: Duration) -> Self {
            Self { timeout }
        }

        async fn try_open(&self, path: &str) -> Result<(), String> {
            let windows_path = pipe_path_to_windows(path);
            let deadline = tokio::time::Instant::now() + self.timeout;
            loop {
                match ClientOptions::new().open(&windows_path) {
                    Ok(client) => {
                        drop(client);
                        return Ok(());
                    }
                    // ERROR_PIPE_BUSY: all instances in use, retry until the deadline
                    Err(e) if e.raw_os_error() == Some(231) => {
                        if tokio::time::Instant::now() >= deadline {
                            return Err(format!("{}: pipe busy", path));
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => return Err(format!("{}: {}", path, e)),
                }
            }
        }
    }

    #[async_trait]
    impl ConnectionStrategy for NamedPipeStrategy {
        fn method(&self) -> Method {
            Method::NamedPipe
        }

        fn skip_reason(&self, address: &EngineAddress) -> Option<String> {
            match address {
                EngineAddress::NamedPipe { .. } => None,
                _ => Some("not a named pipe address".to_string()),
            }
        }

        async fn connect(&self, address: &EngineAddress) -> Result<Connection, BridgeError> {
            let requested = match address {
                EngineAddress::NamedPipe { path } => path.clone(),
                _ => {
                    return Err(BridgeError::DirectConnect {
                        endpoint: address.to_string(),
                        message: "not a named pipe address".to_string(),
                    })
                }
            };

            let mut candidates = vec![requested.clone()];
            candidates.extend(
                KNOWN_ENGINE_PIPES
                    .iter()
                    .map(|p| p.to_string())
                    .filter(|p| *p != requested),
            );

            let mut failures = Vec::new();
            for path in candidates {
                match self.try_open(&path).await {
                    Ok(()) => {
                        tracing::info!("Engine pipe {} is available", path);
                        return Ok(Connection::unmanaged(
                            format!("npipe://{}", path),
                            Method::NamedPipe,
                        ));
                    }
                    Err(e) => failures.push(e),
                }
            }

            Err(BridgeError::DirectConnect {
                endpoint: format!("npipe://{}", requested),
                message: failures.join("; "),
            })
        }
    }
}
