//! wb-bridge: transport bridge engine for whalebridge
//!
//! This crate decides how to reach a container engine (direct connection,
//! SSH tunnel, or SSH plus a remote `socat` bridge), provisions and verifies
//! the remote helper, and tears everything down again.
//!
//! # Modules
//!
//! - `auth`: private key discovery and host-key policy
//! - `ssh`: SSH session management and local port forwarding
//! - `ports`: local port allocation
//! - `remote`: remote helper provisioning and verification
//! - `strategy`: the individual connection strategies
//! - `orchestrator`: ordered strategy fallback
//! - `session`: the live bridge and its teardown
//! - `diagnostics`: stage-by-stage connection checks

pub mod auth;
pub mod diagnostics;
pub mod orchestrator;
pub mod ports;
pub mod remote;
pub mod session;
pub mod ssh;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{CredentialResolver, Credentials, HostKeyPolicy};
pub use diagnostics::{diagnose, CheckResult, CheckStatus};
pub use orchestrator::{ConnectOptions, Orchestrator};
pub use session::BridgeSession;
pub use ssh::{Dialer, SshDialer, SshSession, SshTransport};
pub use strategy::{Connection, ConnectionStrategy};
