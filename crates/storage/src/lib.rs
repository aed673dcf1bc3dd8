//! Filesystem staging primitives and the bundle extractor.
//!
//! Everything here is deliberately small and synchronous at the bottom;
//! callers wrap the expensive walks and the extraction in
//! `tokio::task::spawn_blocking`.

pub mod archive;
pub mod error;
pub mod paths;
pub mod scoped;
pub mod space;

pub use archive::ArchiveError;
pub use error::{StorageError, StorageResult};
pub use scoped::ScopedDir;
