//! Local TCP listener forwarding over SSH channels

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use wb_core::BridgeError;

use super::SshTransport;

/// How long shutdown waits for in-flight relays before giving up on them
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Where each accepted local connection is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardTarget {
    /// `direct-tcpip` channel to `host:port` on the remote side
    DirectTcpip { host: String, port: u16 },
    /// Remote command whose stdin/stdout carry the bytes
    Exec { command: String },
}

/// Accept loop running on a spawned task
///
/// Every accepted connection is relayed on its own task over a fresh
/// stream of the shared SSH connection.
pub struct LocalForwarder {
    local_port: u16,
    cancel: CancellationToken,
    tracker: TaskTracker,
    task: Option<JoinHandle<()>>,
}

impl LocalForwarder {
    /// Start accepting on an already bound listener
    pub fn start(
        listener: TcpListener,
        session: Arc<dyn SshTransport>,
        target: ForwardTarget,
    ) -> Result<Self, BridgeError> {
        let local_port = listener
            .local_addr()
            .map_err(|e| BridgeError::Forwarding(format!("listener has no address: {}", e)))?
            .port();

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let task = tokio::spawn(accept_loop(
            listener,
            session,
            target,
            cancel.clone(),
            tracker.clone(),
        ));

        tracing::info!("Local forwarder listening on 127.0.0.1:{}", local_port);
        Ok(Self {
            local_port,
            cancel,
            tracker,
            task: Some(task),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Stop accepting, cancel relays and wait briefly for them to finish
    pub async fn shutdown(&mut self) -> Result<(), BridgeError> {
        self.cancel.cancel();
        self.tracker.close();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    return Err(BridgeError::Forwarding(format!(
                        "accept loop panicked: {}",
                        e
                    )));
                }
            }
        }

        if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                "Relays on port {} did not finish within {:?}",
                self.local_port,
                RELAY_DRAIN_TIMEOUT
            );
        }
        tracing::debug!("Local forwarder on port {} stopped", self.local_port);
        Ok(())
    }

    /// Stop everything without waiting
    pub fn abort(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LocalForwarder {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    session: Arc<dyn SshTransport>,
    target: ForwardTarget,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("Accepted local connection from {}", peer);
                    let session = Arc::clone(&session);
                    let target = target.clone();
                    let cancel = cancel.clone();
                    tracker.spawn(async move {
                        if let Err(e) = relay(session, target, stream, cancel).await {
                            tracing::warn!("Relay from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

async fn relay(
    session: Arc<dyn SshTransport>,
    target: ForwardTarget,
    stream: TcpStream,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let channel_stream = session.open_stream(&target).await?;

    let (mut local_read, mut local_write) = tokio::io::split(stream);
    let (mut channel_read, mut channel_write) = tokio::io::split(channel_stream);

    // Each direction half-closes its peer on EOF so a request/response
    // exchange completes even when the client shuts down its write side.
    let local_to_remote = async {
        let copied = tokio::io::copy(&mut local_read, &mut channel_write).await;
        let _ = channel_write.shutdown().await;
        copied
    };
    let remote_to_local = async {
        let copied = tokio::io::copy(&mut channel_read, &mut local_write).await;
        let _ = local_write.shutdown().await;
        copied
    };

    tokio::select! {
        (up, down) = async { tokio::join!(local_to_remote, remote_to_local) } => {
            if let Err(e) = up {
                tracing::debug!("Local to remote copy ended: {}", e);
            }
            if let Err(e) = down {
                tracing::debug!("Remote to local copy ended: {}", e);
            }
        }
        _ = cancel.cancelled() => {}
    }

    tracing::debug!("Relay closed");
    Ok(())
}
