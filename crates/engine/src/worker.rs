//! The background worker driving install and uninstall.

use crate::auth::{self, AuthMethod};
use crate::error::WorkerError;
use crate::executor::{ExecutorState, Runtime, app_sub_path, data_sub_path};
use crate::reconcile;
use crate::task::{Stage, aggregate_progress};
use async_trait::async_trait;
use std::sync::Arc;
use stowage_core::{AppIdentity, OperationKind, OperationStatus, StatusEvent};
use stowage_fetch::{DownloadConfig, DownloadObserver, Downloader};
use stowage_storage::{ScopedDir, archive, paths, space};
use tokio::sync::{Mutex, broadcast};

/// What the scheduled worker should do.
pub(crate) enum Operation {
    Install {
        url: String,
        app_name: String,
        category: String,
    },
    Uninstall {
        uninstall_type: String,
        mode: UninstallMode,
    },
}

/// How an uninstall was admitted.
#[derive(Clone, Copy, Debug)]
pub(crate) enum UninstallMode {
    /// A specific installed version.
    Version,
    /// Residual persistent storage; no version remains installed.
    DataOnly,
}

/// Everything the worker task needs, cloneable so it can double as the
/// downloader's progress/cancellation observer.
#[derive(Clone)]
pub(crate) struct WorkerCtx {
    pub state: Arc<Mutex<ExecutorState>>,
    pub events: broadcast::Sender<StatusEvent>,
    pub runtime: Arc<Runtime>,
    pub handle: String,
    pub identity: AppIdentity,
    pub kind: OperationKind,
}

impl WorkerCtx {
    /// Fold a within-stage percentage into the task's aggregate progress.
    /// Progress is monotonically non-decreasing; duplicates are dropped.
    async fn set_stage_progress(&self, stage: Stage, stage_percent: u32) {
        let aggregate = aggregate_progress(stage, stage_percent);
        let advanced = {
            let mut state = self.state.lock().await;
            match state.current.as_mut() {
                Some(task) if task.handle == self.handle && aggregate > task.progress => {
                    task.progress = aggregate;
                    true
                }
                _ => false,
            }
        };
        if advanced {
            tracing::debug!(progress = aggregate, stage = ?stage, "progress");
            self.emit(OperationStatus::Progress, String::new());
        }
    }

    fn emit(&self, status: OperationStatus, details: String) {
        let _ = self.events.send(StatusEvent {
            handle: self.handle.clone(),
            operation: self.kind,
            identity: self.identity.clone(),
            status,
            details,
        });
    }
}

#[async_trait]
impl DownloadObserver for WorkerCtx {
    async fn progress(&self, total: u64, now: u64) {
        let percent = if total > 0 {
            ((now.saturating_mul(100)) / total).min(100) as u32
        } else {
            0
        };
        self.set_stage_progress(Stage::Downloading, percent).await;
    }

    async fn is_cancelled(&self) -> bool {
        let state = self.state.lock().await;
        state
            .current
            .as_ref()
            .map(|task| task.cancelled)
            .unwrap_or(true)
    }
}

/// Run one operation to its terminal event.
///
/// Collects any failure, runs the maintenance pass, clears the task slot
/// and emits exactly one of Success, Failed or Cancelled.
pub(crate) async fn run(ctx: WorkerCtx, operation: Operation) {
    tracing::info!(handle = %ctx.handle, "worker started");

    let result = match &operation {
        Operation::Install {
            url,
            app_name,
            category,
        } => install(&ctx, url, app_name, category).await,
        Operation::Uninstall {
            uninstall_type,
            mode,
        } => uninstall(&ctx, uninstall_type, *mode).await,
    };

    reconcile::run(&ctx.runtime).await;

    {
        let mut state = ctx.state.lock().await;
        state.current = None;
        state.worker = None;
    }

    match result {
        Ok(()) => {
            tracing::info!(handle = %ctx.handle, "worker finished");
            ctx.emit(OperationStatus::Success, String::new());
        }
        Err(e) if e.is_cancelled() => {
            tracing::info!(handle = %ctx.handle, "worker cancelled");
            ctx.emit(OperationStatus::Cancelled, String::new());
        }
        Err(e) => {
            tracing::error!(handle = %ctx.handle, error = %e, "worker failed");
            ctx.emit(OperationStatus::Failed, e.to_string());
        }
    }
}

fn file_name_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

async fn install(
    ctx: &WorkerCtx,
    url: &str,
    app_name: &str,
    category: &str,
) -> Result<(), WorkerError> {
    let identity = &ctx.identity;
    let config = &ctx.runtime.config;

    let method = auth::authentication_method(&identity.app_type, &identity.id, url);
    if method != AuthMethod::None {
        return Err(WorkerError::Failed(format!(
            "Authentication method unsupported: {}",
            method.as_u32()
        )));
    }

    let app_sub = app_sub_path(&identity.id, &identity.version);
    let data_sub = data_sub_path(&identity.id);

    let tmp_dir = format!("{}{}", config.apps_tmp_path(), app_sub);
    // The download area is never committed: it is rolled back on every
    // exit path, success included.
    let _scoped_tmp = ScopedDir::new(&tmp_dir)?;

    let mut downloader = Downloader::new(
        url,
        Arc::new(ctx.clone()),
        DownloadConfig {
            retry_after: config.retry_after(),
            retry_max_times: config.download_retry_max_times,
            timeout: config.download_timeout(),
        },
    )?;

    let download_size = downloader.content_length().await?;
    let tmp_free = space::free_space(&tmp_dir)?;
    tracing::info!(download_size, tmp_free, "checking download size against free space");

    if download_size == 0 {
        return Err(WorkerError::Failed(format!(
            "cannot determine download size of {url}"
        )));
    }
    if download_size > tmp_free {
        return Err(WorkerError::Failed(format!(
            "not enough space on {} (available: {tmp_free}, required: {download_size})",
            config.apps_tmp_path()
        )));
    }

    let tmp_file = format!("{tmp_dir}{}", file_name_of(url));
    downloader.fetch(&tmp_file).await?;

    let app_dir = format!("{}{}", config.apps_path, app_sub);
    let mut scoped_app = ScopedDir::new(&app_dir)?;

    ctx.set_stage_progress(Stage::Extracting, 0).await;
    tracing::info!(archive = %tmp_file, destination = %app_dir, "unpacking bundle");
    archive::unpack(&tmp_file, &app_dir).await?;

    let data_dir = format!("{}{}", config.data_path, data_sub);
    let mut scoped_data = ScopedDir::new(&data_dir)?;

    ctx.set_stage_progress(Stage::UpdatingDatabase, 0).await;
    ctx.runtime
        .catalog
        .add_installed_app(
            &identity.app_type,
            &identity.id,
            &identity.version,
            url,
            app_name,
            category,
            &app_sub,
            &data_sub,
        )
        .await?;

    // Everything went fine, keep the app directories.
    scoped_app.commit();
    scoped_data.commit();

    if !config.annotations_file.is_empty() {
        import_annotations(ctx, &app_dir).await;
    }

    ctx.set_stage_progress(Stage::Finished, 0).await;
    Ok(())
}

async fn uninstall(
    ctx: &WorkerCtx,
    uninstall_type: &str,
    mode: UninstallMode,
) -> Result<(), WorkerError> {
    let identity = &ctx.identity;
    let config = &ctx.runtime.config;
    let catalog = &ctx.runtime.catalog;

    match mode {
        UninstallMode::Version => {
            catalog
                .remove_installed_app(&identity.app_type, &identity.id, &identity.version)
                .await?;

            let app_dir = format!(
                "{}{}",
                config.apps_path,
                app_sub_path(&identity.id, &identity.version)
            );
            tracing::info!(dir = %app_dir, "removing bundle directory");
            paths::remove_directory(&app_dir)?;

            let remaining = catalog
                .installed_versions(&identity.app_type, &identity.id)
                .await?;
            if uninstall_type == "full" && remaining.is_empty() {
                catalog
                    .remove_app_data(&identity.app_type, &identity.id)
                    .await?;
                let data_dir = format!("{}{}", config.data_path, data_sub_path(&identity.id));
                tracing::info!(dir = %data_dir, "removing persistent data directory");
                paths::remove_directory(&data_dir)?;
            }
        }
        UninstallMode::DataOnly => {
            catalog
                .remove_app_data(&identity.app_type, &identity.id)
                .await?;
            let data_dir = format!("{}{}", config.data_path, data_sub_path(&identity.id));
            tracing::info!(dir = %data_dir, "removing residual data directory");
            paths::remove_directory(&data_dir)?;
        }
    }

    ctx.set_stage_progress(Stage::Finished, 0).await;
    Ok(())
}

/// Import annotation keys from a file inside the extracted bundle as
/// metadata. Failures here never fail the install.
async fn import_annotations(ctx: &WorkerCtx, app_dir: &str) {
    let config = &ctx.runtime.config;
    let path = format!("{app_dir}{}", config.annotations_file);

    let result = async {
        let pattern = regex_lite::Regex::new(&config.annotations_regex)
            .map_err(|e| format!("invalid annotations regex: {e}"))?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("cannot read {path}: {e}"))?;
        let values: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| format!("cannot parse {path}: {e}"))?;

        for (key, value) in values {
            if !pattern.is_match(&key) {
                continue;
            }
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            ctx.runtime
                .catalog
                .set_metadata(
                    &ctx.identity.app_type,
                    &ctx.identity.id,
                    &ctx.identity.version,
                    &key,
                    &value,
                )
                .await
                .map_err(|e| format!("cannot store annotation '{key}': {e}"))?;
        }
        Ok::<(), String>(())
    }
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "annotations import skipped");
    }
}
