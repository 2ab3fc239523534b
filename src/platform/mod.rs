//! Platform-specific process and service plumbing.
//!
//! Everything conditionally compiled per OS lives behind this surface; the
//! rest of the crate is OS-agnostic and calls in through these functions.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::*;
