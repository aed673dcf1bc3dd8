//! RPC method handlers.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use stowage_catalog::ListFilters;
use stowage_engine::{EngineResult, StorageDetails};

// =============================================================================
// Envelopes
// =============================================================================

/// Result envelope for methods returning only a code.
#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: u32,
}

impl CodeResponse {
    fn from_result(result: EngineResult<()>) -> Json<Self> {
        match result {
            Ok(()) => Json(Self { code: 0 }),
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "request refused");
                Json(Self { code: e.code() })
            }
        }
    }
}

/// Result envelope for methods returning a task or lock handle.
///
/// On error the handle position carries a diagnostic placeholder such as
/// `"WrongParams"`; real handles are decimal strings.
#[derive(Debug, Serialize)]
pub struct HandleResponse {
    pub code: u32,
    pub handle: String,
}

impl HandleResponse {
    fn from_result(result: EngineResult<String>) -> Json<Self> {
        match result {
            Ok(handle) => Json(Self { code: 0, handle }),
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "request refused");
                Json(Self {
                    code: e.code(),
                    handle: e.handle_placeholder().to_string(),
                })
            }
        }
    }
}

// =============================================================================
// install / uninstall / cancel / getProgress
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    #[serde(rename = "type")]
    pub app_type: String,
    pub id: String,
    pub version: String,
    pub url: String,
    #[serde(rename = "appName", default)]
    pub app_name: String,
    #[serde(default)]
    pub category: String,
}

pub async fn install(
    State(state): State<AppState>,
    Json(req): Json<InstallRequest>,
) -> Json<HandleResponse> {
    HandleResponse::from_result(
        state
            .executor
            .install(
                &req.app_type,
                &req.id,
                &req.version,
                &req.url,
                &req.app_name,
                &req.category,
            )
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct UninstallRequest {
    #[serde(rename = "type")]
    pub app_type: String,
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "uninstallType", default = "default_uninstall_type")]
    pub uninstall_type: String,
}

fn default_uninstall_type() -> String {
    "full".to_string()
}

pub async fn uninstall(
    State(state): State<AppState>,
    Json(req): Json<UninstallRequest>,
) -> Json<HandleResponse> {
    HandleResponse::from_result(
        state
            .executor
            .uninstall(&req.app_type, &req.id, &req.version, &req.uninstall_type)
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct HandleRequest {
    pub handle: String,
}

pub async fn cancel(
    State(state): State<AppState>,
    Json(req): Json<HandleRequest>,
) -> Json<CodeResponse> {
    CodeResponse::from_result(state.executor.cancel(&req.handle).await)
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub code: u32,
    pub progress: u32,
}

pub async fn get_progress(
    State(state): State<AppState>,
    Json(req): Json<HandleRequest>,
) -> Json<ProgressResponse> {
    match state.executor.progress(&req.handle).await {
        Ok(progress) => Json(ProgressResponse { code: 0, progress }),
        Err(e) => Json(ProgressResponse {
            code: e.code(),
            progress: 0,
        }),
    }
}

// =============================================================================
// getStorageDetails / getList
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    #[serde(rename = "type", default)]
    pub app_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StorageDetailsResponse {
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageDetails>,
}

pub async fn get_storage_details(
    State(state): State<AppState>,
    Json(req): Json<IdentityRequest>,
) -> Json<StorageDetailsResponse> {
    match state
        .executor
        .storage_details(&req.app_type, &req.id, &req.version)
        .await
    {
        Ok(storage) => Json(StorageDetailsResponse {
            code: 0,
            storage: Some(storage),
        }),
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "getStorageDetails refused");
            Json(StorageDetailsResponse {
                code: e.code(),
                storage: None,
            })
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    #[serde(rename = "type", default)]
    pub app_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "appName", default)]
    pub app_name: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(rename = "appName")]
    pub app_name: String,
    pub category: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct AppEntry {
    #[serde(rename = "type")]
    pub app_type: String,
    pub id: String,
    pub installed: Vec<VersionEntry>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub code: u32,
    pub apps: Vec<AppEntry>,
}

pub async fn get_list(
    State(state): State<AppState>,
    Json(req): Json<ListRequest>,
) -> Json<ListResponse> {
    let filters = ListFilters {
        app_type: req.app_type,
        id: req.id,
        version: req.version,
        app_name: req.app_name,
        category: req.category,
    };

    let rows = match state.executor.app_details_list(&filters).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "getList refused");
            return Json(ListResponse {
                code: e.code(),
                apps: Vec::new(),
            });
        }
    };

    // Rows arrive ordered by id; fold versions into their app entry.
    // Apps with only persistent data left contribute an empty list.
    let mut apps: Vec<AppEntry> = Vec::new();
    for row in rows {
        if apps.last().map(|a| a.id != row.id).unwrap_or(true) {
            apps.push(AppEntry {
                app_type: row.app_type.clone(),
                id: row.id.clone(),
                installed: Vec::new(),
            });
        }
        if let Some(version) = row.version {
            apps.last_mut().unwrap().installed.push(VersionEntry {
                version,
                app_name: row.app_name.unwrap_or_default(),
                category: row.category.unwrap_or_default(),
                url: row.url.unwrap_or_default(),
            });
        }
    }

    Json(ListResponse { code: 0, apps })
}

// =============================================================================
// Metadata
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SetMetadataRequest {
    #[serde(rename = "type")]
    pub app_type: String,
    pub id: String,
    pub version: String,
    pub key: String,
    #[serde(default)]
    pub value: String,
}

pub async fn set_aux_metadata(
    State(state): State<AppState>,
    Json(req): Json<SetMetadataRequest>,
) -> Json<CodeResponse> {
    CodeResponse::from_result(
        state
            .executor
            .set_metadata(&req.app_type, &req.id, &req.version, &req.key, &req.value)
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct ClearMetadataRequest {
    #[serde(rename = "type")]
    pub app_type: String,
    pub id: String,
    pub version: String,
    /// Empty clears every key of the version.
    #[serde(default)]
    pub key: String,
}

pub async fn clear_aux_metadata(
    State(state): State<AppState>,
    Json(req): Json<ClearMetadataRequest>,
) -> Json<CodeResponse> {
    CodeResponse::from_result(
        state
            .executor
            .clear_metadata(&req.app_type, &req.id, &req.version, &req.key)
            .await,
    )
}

#[derive(Debug, Serialize)]
pub struct MetadataPair {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<serde_json::Value>,
    #[serde(rename = "auxMetadata")]
    pub aux_metadata: Vec<MetadataPair>,
}

pub async fn get_metadata(
    State(state): State<AppState>,
    Json(req): Json<IdentityRequest>,
) -> Json<MetadataResponse> {
    match state
        .executor
        .metadata(&req.app_type, &req.id, &req.version)
        .await
    {
        Ok((details, pairs)) => Json(MetadataResponse {
            code: 0,
            app: Some(json!({
                "type": details.app_type,
                "id": details.id,
                "version": details.version.unwrap_or_default(),
                "appName": details.app_name.unwrap_or_default(),
                "category": details.category.unwrap_or_default(),
                "url": details.url.unwrap_or_default(),
            })),
            aux_metadata: pairs
                .into_iter()
                .map(|(key, value)| MetadataPair { key, value })
                .collect(),
        }),
        Err(e) => Json(MetadataResponse {
            code: e.code(),
            app: None,
            aux_metadata: Vec::new(),
        }),
    }
}

// =============================================================================
// Locks
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LockRequest {
    #[serde(rename = "type")]
    pub app_type: String,
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub owner: String,
}

pub async fn lock(
    State(state): State<AppState>,
    Json(req): Json<LockRequest>,
) -> Json<HandleResponse> {
    HandleResponse::from_result(
        state
            .executor
            .lock(&req.app_type, &req.id, &req.version, &req.reason, &req.owner)
            .await,
    )
}

pub async fn unlock(
    State(state): State<AppState>,
    Json(req): Json<HandleRequest>,
) -> Json<CodeResponse> {
    CodeResponse::from_result(state.executor.unlock(&req.handle).await)
}

#[derive(Debug, Serialize)]
pub struct LockInfoResponse {
    pub code: u32,
    pub reason: String,
    pub owner: String,
}

pub async fn get_lock_info(
    State(state): State<AppState>,
    Json(req): Json<IdentityRequest>,
) -> Json<LockInfoResponse> {
    match state
        .executor
        .lock_info(&req.app_type, &req.id, &req.version)
        .await
    {
        Ok(info) => Json(LockInfoResponse {
            code: 0,
            reason: info.reason,
            owner: info.owner,
        }),
        Err(e) => Json(LockInfoResponse {
            code: e.code(),
            reason: String::new(),
            owner: String::new(),
        }),
    }
}

// =============================================================================
// Forward-compatibility placeholders
// =============================================================================

/// Accepted for forward compatibility; performs no work.
pub async fn reset(Json(_req): Json<serde_json::Value>) -> Json<CodeResponse> {
    Json(CodeResponse { code: 0 })
}

/// Accepted for forward compatibility; performs no work.
pub async fn download(Json(_req): Json<serde_json::Value>) -> Json<HandleResponse> {
    Json(HandleResponse {
        code: 0,
        handle: "Download".to_string(),
    })
}

// =============================================================================
// Health and events
// =============================================================================

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `operationStatus` notifications as a server-sent event stream.
pub async fn operation_status_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.executor.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event("operationStatus")
                        .json_data(&event)
                        .unwrap_or_default();
                    return Some((Ok(sse), rx));
                }
                // A slow consumer missed events; keep streaming the rest.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream)
}
