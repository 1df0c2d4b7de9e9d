//! Error types for watchserve.

use std::path::PathBuf;

/// Result type alias for watchserve operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur while setting up or running a watch server.
///
/// Only setup failures surface here. Steady-state watcher errors are logged
/// and absorbed, and rebuild-callback failures are the callback's own
/// concern; the server neither catches nor inspects them.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The watched path could not be subscribed to.
    ///
    /// Raised at construction and fatal: a server must not start without a
    /// working watch.
    #[error("cannot watch {path}: {reason}")]
    WatchRegistration {
        /// The path that could not be watched.
        path: PathBuf,
        /// Why registration failed.
        reason: String,
    },

    /// The listening address could not be bound.
    ///
    /// Propagated to the caller of the serve API; there is no retry.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
