//! wb-core: Core abstractions and configuration for whalebridge
//!
//! This crate provides the target parser, shared types, the error taxonomy
//! and configuration structures used by the bridge engine and the CLI.

pub mod config;
pub mod error;
pub mod retry;
pub mod target;
pub mod traits;
pub mod types;

pub use error::{BridgeError, ConfigError, FormatError};
pub use target::{parse_engine_address, parse_target, ConnectionTarget, EngineAddress};
pub use types::{Method, PortRange, RemotePid};
