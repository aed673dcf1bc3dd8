//! JSON RPC surface for the stowage engine.
//!
//! One POST route per RPC method, a health probe and an `operationStatus`
//! event stream. Encoding is deliberately thin: handlers translate
//! request payloads into engine calls and engine results into `{code}`
//! envelopes.

pub mod config;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{AppConfig, ServerConfig};
pub use routes::create_router;
pub use state::AppState;
