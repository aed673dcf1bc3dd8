//! Downloader error types.

use thiserror::Error;

/// Download failures.
///
/// `Cancelled` is distinguished from ordinary failures so the caller can
/// report a cancelled operation instead of a failed one.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download error {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http error {0}")]
    Http(u16),

    #[error("download error failed after max retries")]
    RetriesExhausted,

    #[error("download cancelled")]
    Cancelled,

    #[error("error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for download operations.
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;
