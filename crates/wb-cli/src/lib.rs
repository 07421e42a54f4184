//! whalebridge CLI
//!
//! Provides the `whalebridge` binary: open a bridge to a remote engine,
//! diagnose why one cannot be opened, and manage the configuration file.

pub mod commands;
pub mod output;
