//! Error types shared by the cache and key-value stores

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while touching a shared cache file
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file or directory could not be opened
    #[error("Unable to open {path}: {source}")]
    ResourceOpen { path: PathBuf, source: io::Error },

    /// The exclusive lock could not be acquired
    #[error("Unable to lock {path}: {source}")]
    LockAcquisition { path: PathBuf, source: io::Error },

    /// Stored content is malformed or was written by something else
    #[error("Malformed content in {path}: {source}")]
    Deserialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The parent directory could not be created
    #[error("Unable to create the directory {path}: {source}")]
    DirectoryCreate { path: PathBuf, source: io::Error },

    /// An I/O operation failed while the lock was held
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
