//! Scripted remote side for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wb_core::config::BridgeConfig;
use wb_core::traits::{CommandOutput, RemoteShell};
use wb_core::{BridgeError, ConnectionTarget};

use crate::ssh::{Dialer, ForwardTarget, MonitorChannel, RelayStream, SshTransport};

pub(crate) fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_status: Some(0),
    }
}

pub(crate) fn fail(status: u32) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: String::new(),
        exit_status: Some(status),
    }
}

struct Rule {
    needle: String,
    replies: VecDeque<CommandOutput>,
    error: bool,
}

/// Answers commands by substring match; the last reply of a rule repeats.
/// Unmatched commands succeed with empty output.
///
/// Forwarded streams read one request and answer with `stream_reply`, or
/// close at once when there is none.
#[derive(Default)]
pub(crate) struct ScriptedShell {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<String>>,
    disconnected: AtomicBool,
    stream_reply: Option<Vec<u8>>,
    streams: Mutex<Vec<ForwardTarget>>,
    monitor_closed: Arc<AtomicBool>,
}

impl ScriptedShell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, needle: &str, replies: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            replies: replies.into(),
            error: false,
        });
        self
    }

    /// Commands containing `needle` fail at the transport level
    pub(crate) fn erroring(self, needle: &str) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            replies: VecDeque::new(),
            error: true,
        });
        self
    }

    pub(crate) fn answering_streams(mut self, reply: &[u8]) -> Self {
        self.stream_reply = Some(reply.to_vec());
        self
    }

    pub(crate) fn streams(&self) -> Vec<ForwardTarget> {
        self.streams.lock().unwrap().clone()
    }

    pub(crate) fn is_monitor_closed(&self) -> bool {
        self.monitor_closed.load(Ordering::SeqCst)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }

    pub(crate) fn count(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn exec(&self, command: &str) -> Result<CommandOutput, BridgeError> {
        self.log.lock().unwrap().push(command.to_string());
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if command.contains(&rule.needle) {
                if rule.error {
                    return Err(BridgeError::Channel(format!("scripted failure: {}", command)));
                }
                let reply = if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                };
                return Ok(reply.unwrap_or_default());
            }
        }
        Ok(ok(""))
    }

    async fn disconnect(&self) -> Result<(), BridgeError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn host(&self) -> &str {
        "scripted"
    }
}

#[async_trait]
impl SshTransport for ScriptedShell {
    fn shell(&self) -> &dyn RemoteShell {
        self
    }

    async fn open_stream(&self, target: &ForwardTarget) -> Result<RelayStream, BridgeError> {
        self.streams.lock().unwrap().push(target.clone());
        let (local, mut remote) = tokio::io::duplex(4096);
        let reply = self.stream_reply.clone();
        tokio::spawn(async move {
            if let Some(reply) = reply {
                let mut buf = [0u8; 1024];
                let _ = remote.read(&mut buf).await;
                let _ = remote.write_all(&reply).await;
                let _ = remote.shutdown().await;
            }
        });
        Ok(Box::pin(local))
    }

    async fn open_monitor(&self) -> Result<Box<dyn MonitorChannel>, BridgeError> {
        Ok(Box::new(ScriptedMonitor(Arc::clone(&self.monitor_closed))))
    }
}

struct ScriptedMonitor(Arc<AtomicBool>);

#[async_trait]
impl MonitorChannel for ScriptedMonitor {
    async fn close(&mut self) -> Result<(), BridgeError> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the same scripted connection on every dial
pub(crate) struct ScriptedDialer {
    pub(crate) shell: Arc<ScriptedShell>,
}

#[async_trait]
impl Dialer for ScriptedDialer {
    fn check_credentials(&self, _config: &BridgeConfig) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn dial(
        &self,
        _target: &ConnectionTarget,
        _config: &BridgeConfig,
    ) -> Result<Arc<dyn SshTransport>, BridgeError> {
        let transport: Arc<dyn SshTransport> = self.shell.clone();
        Ok(transport)
    }
}
