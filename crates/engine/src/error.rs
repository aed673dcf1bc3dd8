//! Engine error types.

use stowage_catalog::CatalogError;
use stowage_fetch::DownloadError;
use stowage_storage::{ArchiveError, StorageError};
use thiserror::Error;

/// Errors returned from the synchronous API surface.
///
/// Each variant maps to a stable numeric code reported over RPC.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    General(String),

    #[error("wrong params: {0}")]
    WrongParams(String),

    #[error("another operation is in progress")]
    TooManyRequests,

    #[error("app is already installed")]
    AlreadyInstalled,

    #[error("wrong handle")]
    WrongHandle,

    #[error("app is locked")]
    AppLocked,

    #[error("an operation is active on this app")]
    AppUninstalling,
}

impl EngineError {
    /// Stable numeric error code.
    pub fn code(&self) -> u32 {
        match self {
            Self::General(_) => 1,
            Self::WrongParams(_) => 1001,
            Self::TooManyRequests => 1002,
            Self::AlreadyInstalled => 1003,
            Self::WrongHandle => 1007,
            Self::AppLocked => 1009,
            Self::AppUninstalling => 1010,
        }
    }

    /// Diagnostic placeholder returned in the handle position when an
    /// operation is refused. Real handles are decimal strings and can
    /// never collide with these literals.
    pub fn handle_placeholder(&self) -> &'static str {
        match self {
            Self::General(_) => "GeneralError",
            Self::WrongParams(_) => "WrongParams",
            Self::TooManyRequests => "TooManyRequests",
            Self::AlreadyInstalled => "AlreadyInstalled",
            Self::WrongHandle => "WrongHandle",
            Self::AppLocked => "AppLocked",
            Self::AppUninstalling => "AppUninstalling",
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        Self::General(e.to_string())
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        Self::General(e.to_string())
    }
}

/// Result type for API operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures collected inside the background worker and mapped to a
/// terminal status event in one place.
#[derive(Debug, Error)]
pub(crate) enum WorkerError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Filesystem(#[from] StorageError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Failed(String),
}

impl WorkerError {
    /// True when the operation was cancelled rather than having failed.
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self, Self::Download(DownloadError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::General(String::new()).code(), 1);
        assert_eq!(EngineError::WrongParams(String::new()).code(), 1001);
        assert_eq!(EngineError::TooManyRequests.code(), 1002);
        assert_eq!(EngineError::AlreadyInstalled.code(), 1003);
        assert_eq!(EngineError::WrongHandle.code(), 1007);
        assert_eq!(EngineError::AppLocked.code(), 1009);
        assert_eq!(EngineError::AppUninstalling.code(), 1010);
    }

    #[test]
    fn cancelled_download_is_distinguished() {
        let cancelled = WorkerError::Download(DownloadError::Cancelled);
        assert!(cancelled.is_cancelled());
        let failed = WorkerError::Failed("x".to_string());
        assert!(!failed.is_cancelled());
    }
}
