//! Readiness check for a freshly launched helper
//!
//! The helper is polled until it is both alive and listening, or until a
//! deadline passes. A process that exits during polling fails immediately.

use std::time::Duration;

use tokio::time::Instant;
use wb_core::config::BridgeConfig;
use wb_core::traits::RemoteShell;
use wb_core::{BridgeError, RemotePid};

use super::commands;

/// Polls a remote helper until it is ready
pub struct BridgeVerifier<'a> {
    shell: &'a dyn RemoteShell,
    log_dir: String,
    interval: Duration,
    deadline: Duration,
    settle: Duration,
    check_listening: bool,
}

impl<'a> BridgeVerifier<'a> {
    pub fn new(shell: &'a dyn RemoteShell, config: &BridgeConfig) -> Self {
        Self {
            shell,
            log_dir: config.remote_log_dir.clone(),
            interval: config.verify_interval,
            deadline: config.verify_timeout,
            settle: config.verify_settle,
            check_listening: config.verify_listening,
        }
    }

    /// Wait until `pid` is alive and, if enabled, `port` is listening
    ///
    /// With the listening check disabled, a process still alive once the
    /// settle delay has passed counts as ready.
    pub async fn verify(&self, port: u16, pid: RemotePid) -> Result<(), BridgeError> {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;

            if !self.is_alive(pid).await? {
                let log = self.log_tail(port).await;
                return Err(BridgeError::VerificationTimeout {
                    pid,
                    message: format!("process exited before listening on port {}{}", port, log),
                });
            }

            let ready = if self.check_listening {
                self.is_listening(port).await?
            } else {
                started.elapsed() >= self.settle
            };

            if ready {
                tracing::debug!(
                    "Bridge helper {} ready on port {} after {} poll(s) in {:?}",
                    pid,
                    port,
                    polls,
                    started.elapsed()
                );
                return Ok(());
            }

            if started.elapsed() + self.interval > self.deadline {
                let log = self.log_tail(port).await;
                return Err(BridgeError::VerificationTimeout {
                    pid,
                    message: format!(
                        "port {} not listening after {:?}{}",
                        port, self.deadline, log
                    ),
                });
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    async fn is_alive(&self, pid: RemotePid) -> Result<bool, BridgeError> {
        Ok(self
            .shell
            .exec(&commands::process_alive(pid))
            .await?
            .success())
    }

    async fn is_listening(&self, port: u16) -> Result<bool, BridgeError> {
        Ok(self
            .shell
            .exec(&commands::port_listening(port))
            .await?
            .success())
    }

    async fn log_tail(&self, port: u16) -> String {
        match self
            .shell
            .exec(&commands::log_tail(&self.log_dir, port))
            .await
        {
            Ok(output) if !output.trimmed().is_empty() => {
                format!("\nremote log:\n{}", output.trimmed())
            }
            _ => String::new(),
        }
    }
}
