//! Error types for mirroring and watching.

use std::path::{Path, PathBuf};

/// Failure while building or refreshing the mirror.
///
/// During setup any of these aborts the build; during the run they only
/// affect the one file being refreshed.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Scratch directory could not be allocated.
    #[error("Failed to create mirror directory: {0}")]
    Scratch(#[source] std::io::Error),

    /// Source root does not exist or cannot be resolved.
    #[error("Cannot resolve source directory {}: {source}", path.display())]
    SourceRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file or directory could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mirror file or directory could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be registered for change notification.
    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Path is not inside the source root.
    #[error("{} is outside the source directory", .0.display())]
    OutsideRoot(PathBuf),
}

impl MirrorError {
    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failure of the change watcher itself.
///
/// Once the notification stream is gone the mirror can no longer be kept
/// coherent, so these end the run.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The platform watcher could not be created.
    #[error("Failed to create file watcher: {0}")]
    Create(#[source] notify::Error),

    /// The platform watcher reported an error.
    #[error("File watcher failed: {0}")]
    Notify(#[from] notify::Error),

    /// The notification stream ended without being asked to.
    #[error("File notification stream closed unexpectedly")]
    StreamClosed,
}
