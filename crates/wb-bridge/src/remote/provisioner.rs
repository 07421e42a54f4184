//! Launching the remote bridging helper

use wb_core::config::BridgeConfig;
use wb_core::traits::RemoteShell;
use wb_core::types::describe_ranges;
use wb_core::{BridgeError, RemotePid};

use super::commands;

/// A launched helper: where it listens and which process it is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteBridge {
    pub remote_port: u16,
    pub remote_pid: RemotePid,
}

/// Prepares the remote side of a proxy bridge
///
/// Each step runs on its own channel. Nothing here tries to repair the
/// remote host: a missing helper or socket is reported, not installed.
pub struct BridgeProvisioner<'a> {
    shell: &'a dyn RemoteShell,
    config: &'a BridgeConfig,
}

impl<'a> BridgeProvisioner<'a> {
    pub fn new(shell: &'a dyn RemoteShell, config: &'a BridgeConfig) -> Self {
        Self { shell, config }
    }

    /// Check, pick a port, reclaim, launch
    pub async fn provision(&self, requested_port: Option<u16>) -> Result<RemoteBridge, BridgeError> {
        self.check_helper().await?;
        self.check_socket().await?;

        let reclaim = self.config.reclaim_stale;
        let remote_port = match requested_port {
            Some(port) => {
                if reclaim {
                    self.reclaim_port(port).await?;
                }
                if self.port_in_use(port).await? {
                    return Err(BridgeError::PortExhaustion {
                        ranges: port.to_string(),
                    });
                }
                port
            }
            None => {
                if reclaim {
                    self.reclaim_recorded().await?;
                }
                let port = self.find_free_port().await?;
                if reclaim {
                    self.reclaim_port(port).await?;
                }
                port
            }
        };

        let remote_pid = self.launch(remote_port).await?;
        tracing::info!(
            "Bridge helper started on {}:{} (pid {})",
            self.shell.host(),
            remote_port,
            remote_pid
        );

        Ok(RemoteBridge {
            remote_port,
            remote_pid,
        })
    }

    pub async fn check_helper(&self) -> Result<(), BridgeError> {
        let helper = &self.config.helper;
        let output = self.shell.exec(&commands::helper_available(helper)).await?;
        if !output.success() {
            return Err(BridgeError::HelperUnavailable {
                helper: helper.clone(),
            });
        }

        if let Ok(version) = self.shell.exec(&commands::helper_version(helper)).await {
            let banner = version.trimmed();
            if !banner.is_empty() {
                tracing::debug!("Remote {} version: {}", helper, banner.replace('\n', " | "));
            }
        }
        Ok(())
    }

    pub async fn check_socket(&self) -> Result<(), BridgeError> {
        let socket = &self.config.remote_socket;
        let output = self.shell.exec(&commands::socket_accessible(socket)).await?;
        if !output.success() {
            return Err(BridgeError::SocketAccess {
                socket: socket.clone(),
            });
        }
        Ok(())
    }

    pub async fn port_in_use(&self, port: u16) -> Result<bool, BridgeError> {
        Ok(self
            .shell
            .exec(&commands::port_listening(port))
            .await?
            .success())
    }

    /// First remote port, in range order, with no listener
    pub async fn find_free_port(&self) -> Result<u16, BridgeError> {
        let ranges = &self.config.remote_port_ranges;
        for range in ranges.iter().filter(|r| r.is_valid()) {
            for port in range.ports() {
                if !self.port_in_use(port).await? {
                    tracing::debug!("Remote port {} is free", port);
                    return Ok(port);
                }
            }
        }
        Err(BridgeError::PortExhaustion {
            ranges: describe_ranges(ranges),
        })
    }

    /// Kill helpers recorded by earlier bridges and forget their records
    pub async fn reclaim_recorded(&self) -> Result<(), BridgeError> {
        tracing::debug!("Reclaiming recorded helpers in {}", self.config.remote_log_dir);
        self.shell
            .exec(&commands::reclaim_recorded(
                &self.config.helper,
                &self.config.remote_log_dir,
            ))
            .await?;
        Ok(())
    }

    /// Kill a helper an abandoned bridge left on `port`
    pub async fn reclaim_port(&self, port: u16) -> Result<(), BridgeError> {
        tracing::debug!("Reclaiming remote port {}", port);
        self.shell
            .exec(&commands::reclaim_port(
                &self.config.helper,
                port,
                &self.config.remote_log_dir,
            ))
            .await?;
        Ok(())
    }

    /// Start the detached helper and read back its pid
    pub async fn launch(&self, port: u16) -> Result<RemotePid, BridgeError> {
        let config = self.config;
        let command = commands::launch(
            &config.helper,
            &config.remote_bind_address,
            port,
            &config.remote_socket,
            &config.remote_log_dir,
        );
        let output = self.shell.exec(&command).await?;

        if !output.success() {
            let log = self.log_tail(port).await;
            return Err(BridgeError::LaunchFailed(format!(
                "launch command exited with {:?}: {}{}",
                output.exit_status,
                output.stderr.trim(),
                log
            )));
        }

        match RemotePid::from_output(&output.stdout) {
            Some(pid) => Ok(pid),
            None => {
                let log = self.log_tail(port).await;
                Err(BridgeError::LaunchFailed(format!(
                    "no process id in launch output '{}'{}",
                    output.trimmed(),
                    log
                )))
            }
        }
    }

    /// Remote log tail formatted for an error message, or empty
    pub async fn log_tail(&self, port: u16) -> String {
        match self
            .shell
            .exec(&commands::log_tail(&self.config.remote_log_dir, port))
            .await
        {
            Ok(output) if !output.trimmed().is_empty() => {
                format!("\nremote log:\n{}", output.trimmed())
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fail, ok, ScriptedShell};
    use wb_core::PortRange;

    fn config() -> BridgeConfig {
        BridgeConfig {
            remote_port_ranges: vec![PortRange::new(2376, 2378)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_provision_happy_path() {
        let shell = ScriptedShell::new()
            .on("grep -q ':2376 '", vec![ok("")])
            .on("grep -q ':2377 '", vec![fail(1)])
            .on("nohup", vec![ok("4242\n")]);
        let config = config();

        let bridge = BridgeProvisioner::new(&shell, &config)
            .provision(None)
            .await
            .unwrap();

        assert_eq!(bridge.remote_port, 2377);
        assert_eq!(bridge.remote_pid, RemotePid(4242));
        assert!(shell.ran("command -v socat"));
        assert!(shell.ran("test -S /var/run/docker.sock"));
        assert!(shell.ran("whalebridge-*.pid"));
        assert!(shell.ran("TCP-LISTEN:2377,bind=127.0.0.1"));
    }

    #[tokio::test]
    async fn test_abandoned_helpers_are_killed_before_search() {
        let shell = ScriptedShell::new()
            .on("grep -q ':2376 '", vec![ok("")])
            .on("grep -q ':2377 '", vec![fail(1)])
            .on("nohup", vec![ok("4243\n")]);
        let config = config();

        let bridge = BridgeProvisioner::new(&shell, &config)
            .provision(None)
            .await
            .unwrap();
        assert_eq!(bridge.remote_port, 2377);

        let commands = shell.commands();
        let position = |needle: &str| commands.iter().position(|c| c.contains(needle)).unwrap();
        let recorded = position("kill \"$(cat \"$f\")\"");
        let first_search = position("grep -q");
        let chosen = position("pkill -f '[s]ocat TCP-LISTEN:2377,'");
        let launch = position("nohup");

        assert!(commands[recorded].contains("pkill -f \"[s]ocat TCP-LISTEN:$p,\""));
        assert!(recorded < first_search);
        assert!(first_search < chosen);
        assert!(chosen < launch);
    }

    #[tokio::test]
    async fn test_reclaim_disabled_leaves_remote_processes_alone() {
        let shell = ScriptedShell::new()
            .on("grep -q", vec![fail(1)])
            .on("nohup", vec![ok("7\n")]);
        let config = BridgeConfig {
            reclaim_stale: false,
            ..config()
        };

        BridgeProvisioner::new(&shell, &config)
            .provision(None)
            .await
            .unwrap();

        assert!(!shell.ran("kill"));
    }

    #[tokio::test]
    async fn test_missing_helper_stops_before_launch() {
        let shell = ScriptedShell::new().on("command -v", vec![fail(1)]);
        let config = config();

        let err = BridgeProvisioner::new(&shell, &config)
            .provision(None)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::HelperUnavailable { .. }));
        assert!(!shell.ran("nohup"));
        assert!(!shell.ran("test -S"));
    }

    #[tokio::test]
    async fn test_inaccessible_socket() {
        let shell = ScriptedShell::new().on("test -S", vec![fail(1)]);
        let config = config();

        let err = BridgeProvisioner::new(&shell, &config)
            .provision(None)
            .await
            .unwrap_err();

        match err {
            BridgeError::SocketAccess { socket } => assert_eq!(socket, "/var/run/docker.sock"),
            other => panic!("expected SocketAccess, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_remote_ports_busy() {
        let shell = ScriptedShell::new().on("grep -q", vec![ok("")]);
        let config = config();

        let err = BridgeProvisioner::new(&shell, &config)
            .provision(None)
            .await
            .unwrap_err();

        match err {
            BridgeError::PortExhaustion { ranges } => assert_eq!(ranges, "2376-2378"),
            other => panic!("expected PortExhaustion, got {:?}", other),
        }
        assert_eq!(shell.count("grep -q"), 3);
    }

    #[tokio::test]
    async fn test_explicit_port_is_reclaimed_first() {
        let shell = ScriptedShell::new()
            .on("grep -q", vec![fail(1)])
            .on("nohup", vec![ok("99\n")]);
        let config = config();

        let bridge = BridgeProvisioner::new(&shell, &config)
            .provision(Some(2400))
            .await
            .unwrap();

        assert_eq!(bridge.remote_port, 2400);
        let commands = shell.commands();
        let reclaim = commands
            .iter()
            .position(|c| c.contains("[s]ocat TCP-LISTEN:2400,"))
            .unwrap();
        let launch = commands.iter().position(|c| c.contains("nohup")).unwrap();
        assert!(reclaim < launch);
    }

    #[tokio::test]
    async fn test_unparseable_pid_attaches_log() {
        let shell = ScriptedShell::new()
            .on("grep -q", vec![fail(1)])
            .on("nohup", vec![ok("\n")])
            .on("tail -n 20", vec![ok("socat[1] E bind: Address in use\n")]);
        let config = config();

        let err = BridgeProvisioner::new(&shell, &config)
            .provision(None)
            .await
            .unwrap_err();

        match err {
            BridgeError::LaunchFailed(message) => {
                assert!(message.contains("Address in use"), "{}", message)
            }
            other => panic!("expected LaunchFailed, got {:?}", other),
        }
    }
}
