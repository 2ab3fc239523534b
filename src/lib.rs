//! Self-updating supervisor for a single child executable.
//!
//! Watches a staging directory for newer builds of the child (and of the
//! supervisor itself), swaps binaries in place, and restarts the child.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binary (src/bin/main.rs)
// Test dependencies are only used in test code
#[cfg(test)]
use assert_cmd as _;
#[cfg(test)]
use predicates as _;
use tempfile as _;
use tracing_subscriber as _;

/// On-disk executable snapshots.
pub mod binary;

/// Cancellation token tree.
pub mod cancel;

/// CLI parsing.
pub mod cli;

/// Engine configuration.
pub mod config;

/// Errors.
pub mod error;

/// Platform adapters.
pub mod platform;

/// Child process control.
pub mod process;

/// Supervision engine.
pub mod supervisor;

/// In-place binary swap.
pub mod swap;
