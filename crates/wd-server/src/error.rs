//! Error types for the live server.

use wd_mirror::{MirrorError, WatchError};

/// Server error type.
///
/// Everything here is fatal to the run: setup failures keep the server
/// from starting, watcher failures stop it.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Building the mirror failed.
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// The change watcher failed to start or stopped unexpectedly.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// The HTTP server failed.
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}
