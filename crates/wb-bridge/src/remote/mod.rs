//! Remote bridging helper
//!
//! The helper (`socat`) is launched detached on the remote host, listens on a
//! TCP port, and relays every connection to the engine's control socket.

pub mod commands;
mod provisioner;
mod verifier;

pub use provisioner::{BridgeProvisioner, RemoteBridge};
pub use verifier::BridgeVerifier;
