//! Filesystem error types.

use thiserror::Error;

/// Filesystem operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("error {source} on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for filesystem operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
