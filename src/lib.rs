//! Command-line front end and service for diff-server databases.
//!
//! The binary in `src/bin/diffs.rs` is a thin wrapper around [`cli::run`].

#![warn(missing_docs)]

pub mod capture;
pub mod cli;
pub mod db;
pub mod logging;
pub mod serve;
pub mod signal;
pub mod spec;

/// Version reported by `diffs --version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
