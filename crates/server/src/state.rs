//! Application state shared across handlers.

use std::sync::Arc;
use stowage_engine::Executor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The installation engine.
    pub executor: Arc<Executor>,
}

impl AppState {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }
}
