//! SSH session management
//!
//! One authenticated connection per bridge; every remote command and every
//! forwarded local connection gets its own channel on it.

mod forward;
mod session;
mod transport;

pub use forward::{ForwardTarget, LocalForwarder};
pub use session::SshSession;
pub use transport::{Dialer, MonitorChannel, RelayIo, RelayStream, SshDialer, SshTransport};
