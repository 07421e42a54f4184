//! Core trait definitions

mod remote;

pub use remote::{CommandOutput, RemoteShell};
