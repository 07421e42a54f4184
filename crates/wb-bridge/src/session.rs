//! Live bridge ownership and teardown
//!
//! A [`BridgeSession`] owns the SSH connection, the local forwarder and the
//! remote helper of one established bridge. Closing it releases all three,
//! in that order, and is safe to repeat.

use std::sync::Arc;
use std::time::Duration;

use wb_core::config::BridgeConfig;
use wb_core::traits::RemoteShell;
use wb_core::{BridgeError, Method, RemotePid};

use crate::remote::{commands, RemoteBridge};
use crate::ssh::{LocalForwarder, MonitorChannel, SshTransport};

/// What teardown needs to know about the remote helper
#[derive(Debug, Clone)]
pub struct TeardownSettings {
    pub helper: String,
    pub log_dir: String,
    pub kill_grace: Duration,
}

impl TeardownSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            helper: config.helper.clone(),
            log_dir: config.remote_log_dir.clone(),
            kill_grace: config.kill_grace,
        }
    }
}

/// Resources to release, each optional so a partially built bridge can be
/// cleaned up with the same steps as a complete one
pub struct Teardown {
    settings: TeardownSettings,
    ssh: Option<Arc<dyn SshTransport>>,
    monitor: Option<Box<dyn MonitorChannel>>,
    forwarder: Option<LocalForwarder>,
    remote_port: Option<u16>,
    remote_pid: Option<RemotePid>,
}

impl Teardown {
    pub fn new(settings: TeardownSettings) -> Self {
        Self {
            settings,
            ssh: None,
            monitor: None,
            forwarder: None,
            remote_port: None,
            remote_pid: None,
        }
    }

    pub fn with_ssh(mut self, ssh: Arc<dyn SshTransport>) -> Self {
        self.ssh = Some(ssh);
        self
    }

    pub fn with_remote(mut self, remote_port: u16, remote_pid: Option<RemotePid>) -> Self {
        self.remote_port = Some(remote_port);
        self.remote_pid = remote_pid;
        self
    }

    pub fn with_forwarder(mut self, forwarder: LocalForwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn with_monitor(mut self, monitor: Box<dyn MonitorChannel>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Whether anything is left to release
    pub fn is_empty(&self) -> bool {
        self.ssh.is_none()
            && self.monitor.is_none()
            && self.forwarder.is_none()
            && self.remote_port.is_none()
    }

    /// Release everything still held; every step runs even if earlier ones fail
    pub async fn run(&mut self) -> Result<(), BridgeError> {
        let mut errors = Vec::new();

        if let Some(port) = self.remote_port.take() {
            let pid = self.remote_pid.take();
            match self.ssh.as_deref() {
                Some(ssh) => {
                    for e in stop_remote_helper(ssh.shell(), &self.settings, port, pid).await {
                        errors.push(format!("stop remote helper on port {}: {}", port, e));
                    }
                }
                None => errors.push(format!(
                    "no SSH session left to stop remote helper on port {}",
                    port
                )),
            }
        }

        if let Some(mut forwarder) = self.forwarder.take() {
            if let Err(e) = forwarder.shutdown().await {
                errors.push(format!("stop local forwarder: {}", e));
            }
        }

        if let Some(mut monitor) = self.monitor.take() {
            if let Err(e) = monitor.close().await {
                tracing::debug!("Monitor channel close: {}", e);
            }
        }

        if let Some(ssh) = self.ssh.take() {
            if let Err(e) = ssh.disconnect().await {
                errors.push(format!("disconnect from {}: {}", ssh.host(), e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Teardown(errors))
        }
    }
}

/// Graceful kill, grace period, listening re-check, forced kill, pid file removal
///
/// Every step runs even when an earlier one failed; the failures are returned.
async fn stop_remote_helper(
    shell: &dyn RemoteShell,
    settings: &TeardownSettings,
    port: u16,
    pid: Option<RemotePid>,
) -> Vec<BridgeError> {
    tracing::debug!("Stopping remote helper on port {} (pid {:?})", port, pid);
    let mut errors = Vec::new();

    if let Err(e) = shell
        .exec(&commands::graceful_kill(pid, &settings.helper, port))
        .await
    {
        errors.push(e);
    }

    tokio::time::sleep(settings.kill_grace).await;

    // An unanswered re-check counts as still listening
    let still_listening = match shell.exec(&commands::port_listening(port)).await {
        Ok(output) => output.success(),
        Err(e) => {
            errors.push(e);
            true
        }
    };
    if still_listening {
        tracing::warn!("Remote helper on port {} still listening, forcing", port);
        if let Err(e) = shell
            .exec(&commands::force_kill(pid, &settings.helper, port))
            .await
        {
            errors.push(e);
        }
    }

    if let Err(e) = shell
        .exec(&commands::remove_pid_file(&settings.log_dir, port))
        .await
    {
        errors.push(e);
    }
    errors
}

/// An established bridge
///
/// Built only from fully provisioned and verified parts. After [`close`]
/// it holds nothing and cannot be reused.
///
/// [`close`]: BridgeSession::close
pub struct BridgeSession {
    method: Method,
    local_port: u16,
    remote_host: String,
    remote_port: Option<u16>,
    remote_pid: Option<RemotePid>,
    teardown: Teardown,
    closed: bool,
}

impl BridgeSession {
    /// Tunnel bridge: every local connection runs its own remote relay
    pub fn tunnel(
        ssh: Arc<dyn SshTransport>,
        forwarder: LocalForwarder,
        settings: TeardownSettings,
    ) -> Self {
        let local_port = forwarder.local_port();
        let remote_host = ssh.host().to_string();
        Self {
            method: Method::Tunnel,
            local_port,
            remote_host,
            remote_port: None,
            remote_pid: None,
            teardown: Teardown::new(settings)
                .with_ssh(ssh)
                .with_forwarder(forwarder),
            closed: false,
        }
    }

    /// Proxy bridge: a detached remote helper reached over direct-tcpip
    pub fn proxy_bridge(
        ssh: Arc<dyn SshTransport>,
        forwarder: LocalForwarder,
        monitor: Option<Box<dyn MonitorChannel>>,
        remote: RemoteBridge,
        settings: TeardownSettings,
    ) -> Self {
        let local_port = forwarder.local_port();
        let remote_host = ssh.host().to_string();
        let mut teardown = Teardown::new(settings)
            .with_ssh(ssh)
            .with_remote(remote.remote_port, Some(remote.remote_pid))
            .with_forwarder(forwarder);
        if let Some(monitor) = monitor {
            teardown = teardown.with_monitor(monitor);
        }
        Self {
            method: Method::ProxyBridge,
            local_port,
            remote_host,
            remote_port: Some(remote.remote_port),
            remote_pid: Some(remote.remote_pid),
            teardown,
            closed: false,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// `tcp://127.0.0.1:<local_port>`
    pub fn endpoint(&self) -> String {
        format!("tcp://127.0.0.1:{}", self.local_port)
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.remote_port
    }

    pub fn remote_pid(&self) -> Option<RemotePid> {
        self.remote_pid
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Tear the bridge down. A second call does nothing.
    ///
    /// Failures are reported together as [`BridgeError::Teardown`] after every
    /// step has been attempted.
    pub async fn close(&mut self) -> Result<(), BridgeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::info!(
            "Closing {} bridge to {} (local port {})",
            self.method,
            self.remote_host,
            self.local_port
        );
        self.teardown.run().await
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if !self.closed && !self.teardown.is_empty() {
            tracing::warn!(
                "Bridge to {} dropped without close; remote helper may be left running",
                self.remote_host
            );
            if let Some(forwarder) = self.teardown.forwarder.as_mut() {
                forwarder.abort();
            }
        }
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("method", &self.method)
            .field("local_port", &self.local_port)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("remote_pid", &self.remote_pid)
            .field("closed", &self.closed)
            .finish()
    }
}
