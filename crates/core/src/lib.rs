//! Core domain types shared across the stowage crates.
//!
//! This crate defines the canonical data model used everywhere else:
//! - Application identity (type, id, version)
//! - Engine configuration and its defaults
//! - Operation kinds, statuses and the status event payload

pub mod config;
pub mod events;
pub mod identity;

pub use config::EngineConfig;
pub use events::{OperationKind, OperationStatus, StatusEvent};
pub use identity::AppIdentity;

/// Namespace component under every root, reserved for on-disk format
/// migrations. Directories under a root that do not match the current
/// epoch are removed at configure time.
pub const EPOCH: &str = "0";
