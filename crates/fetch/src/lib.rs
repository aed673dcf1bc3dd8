//! HTTP bundle downloader.
//!
//! Streams a remote resource to a file with progress callbacks and
//! cooperative cancellation, honoring the `Retry-After` contract for
//! 202 Accepted responses.

pub mod downloader;
pub mod error;

pub use downloader::{DownloadConfig, DownloadObserver, Downloader};
pub use error::{DownloadError, DownloadResult};
