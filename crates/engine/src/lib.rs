//! The installation engine.
//!
//! The [`Executor`] validates requests on the caller's task, runs at most
//! one background worker at a time, drives the staged install/uninstall
//! state machine, publishes progress and terminal status events, and
//! performs a post-operation maintenance pass that heals drift between
//! the catalog and the filesystem.

pub mod auth;
pub mod error;
pub mod executor;
pub mod locks;
mod reconcile;
mod task;
mod worker;

pub use error::{EngineError, EngineResult};
pub use executor::{Executor, StorageDetails};
pub use locks::LockInfo;
