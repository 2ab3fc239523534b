use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while snapshotting an on-disk executable.
#[derive(Debug, Error)]
pub enum BinaryError {
    /// The path could not be resolved to an absolute path.
    #[error("Failed to resolve '{path}': {source}")]
    Resolve {
        /// The path that failed to resolve.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// The file could not be stat'ed (missing, unreadable).
    #[error("Failed to stat '{path}': {source}")]
    Stat {
        /// The path that failed to stat.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// The file could not be opened or read while hashing its content.
    #[error("Failed to hash '{path}': {source}")]
    Digest {
        /// The path that failed to hash.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },
}

impl BinaryError {
    /// Whether the underlying cause is a missing file.
    ///
    /// Staging probes map this case to "running copy is latest"; every other
    /// filesystem error is surfaced to the caller.
    pub fn is_not_found(&self) -> bool {
        let (BinaryError::Resolve { source, .. }
        | BinaryError::Stat { source, .. }
        | BinaryError::Digest { source, .. }) = self;
        source.kind() == io::ErrorKind::NotFound
    }
}

/// Errors raised by the in-place binary swap.
#[derive(Debug, Error)]
pub enum SwapError {
    /// The staging source could not be opened for reading.
    #[error("Failed to open staging source '{path}': {source}")]
    Source {
        /// The staging file that failed to open.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// The destination could not be opened for overwrite.
    #[error("Failed to open swap destination '{path}': {source}")]
    Destination {
        /// The destination that failed to open.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// Copying the staging content over the destination failed midway.
    #[error("Failed to copy '{from}' over '{to}': {source}")]
    Copy {
        /// The staging source.
        from: PathBuf,
        /// The destination being overwritten.
        to: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// The swapped file could not be marked executable.
    #[error("Failed to mark '{path}' executable: {source}")]
    Permissions {
        /// The destination that failed the permission change.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },
}

/// Errors emitted by the supervision engine.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Binary(#[from] BinaryError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    /// A child (or detached updater) process failed to spawn.
    #[error("Failed to spawn '{path}': {source}")]
    Spawn {
        /// The executable that failed to spawn.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    /// The OS could not report the supervisor's own executable path.
    #[error("Failed to locate own executable: {0}")]
    SelfLocate(#[source] io::Error),

    /// The console interrupt handler could not be installed.
    #[error("Failed to install interrupt handler: {0}")]
    Interrupt(#[from] ctrlc::Error),

    /// Every event producer hung up while the loop was still running.
    #[error("Event channel closed unexpectedly")]
    EventChannelClosed,

    /// Restarting an installed service failed.
    #[error("Failed to restart service '{name}': {source}")]
    ServiceRestart {
        /// The installed service name.
        name: String,
        /// The underlying error that occurred.
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Error from the Windows service control manager.
    #[cfg(windows)]
    #[error("Service control error: {0}")]
    Service(#[from] windows_service::Error),
}
