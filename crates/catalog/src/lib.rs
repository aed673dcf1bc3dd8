//! SQLite-backed application catalog.
//!
//! Three normalized tables track registered applications, their installed
//! versions and per-version metadata. The schema column names are
//! normative for interoperability with databases written by earlier
//! deployments of this service.

pub mod error;
pub mod models;
pub mod store;

pub use error::{CatalogError, CatalogResult};
pub use models::{AppDetails, AppRef, InstalledRef, ListFilters};
pub use store::SqliteCatalog;
