//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/v1/health", get(handlers::health_check))
        // Lifecycle operations
        .route("/v1/rpc/install", post(handlers::install))
        .route("/v1/rpc/uninstall", post(handlers::uninstall))
        .route("/v1/rpc/cancel", post(handlers::cancel))
        .route("/v1/rpc/getProgress", post(handlers::get_progress))
        // Queries
        .route("/v1/rpc/getStorageDetails", post(handlers::get_storage_details))
        .route("/v1/rpc/getList", post(handlers::get_list))
        .route("/v1/rpc/getMetadata", post(handlers::get_metadata))
        // Metadata mutation
        .route("/v1/rpc/setAuxMetadata", post(handlers::set_aux_metadata))
        .route("/v1/rpc/clearAuxMetadata", post(handlers::clear_aux_metadata))
        // Advisory locks
        .route("/v1/rpc/lock", post(handlers::lock))
        .route("/v1/rpc/unlock", post(handlers::unlock))
        .route("/v1/rpc/getLockInfo", post(handlers::get_lock_info))
        // Forward-compatibility placeholders
        .route("/v1/rpc/reset", post(handlers::reset))
        .route("/v1/rpc/download", post(handlers::download))
        // Asynchronous operationStatus notifications
        .route("/v1/events", get(handlers::operation_status_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
