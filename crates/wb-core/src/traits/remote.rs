//! Remote command execution

use async_trait::async_trait;

use crate::error::BridgeError;

/// Result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the server closed the channel without reporting a status
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    /// Exit status zero
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Stdout with surrounding whitespace removed
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Abstraction over an authenticated shell on the remote host
///
/// Every call runs on its own short-lived channel, so commands never share
/// state. A non-zero exit status is reported through [`CommandOutput`]; only
/// transport failures are errors.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run one command and collect its output
    async fn exec(&self, command: &str) -> Result<CommandOutput, BridgeError>;

    /// Close the underlying connection
    async fn disconnect(&self) -> Result<(), BridgeError>;

    /// Host this shell is connected to, for log messages
    fn host(&self) -> &str;
}
