//! The orchestration core.

use crate::error::{EngineError, EngineResult};
use crate::locks::{LockInfo, LockRegistry};
use crate::task::{self, STAGE_BASE, Stage, Task};
use crate::worker::{self, Operation, UninstallMode, WorkerCtx};
use crate::reconcile;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stowage_catalog::{AppDetails, CatalogError, ListFilters, SqliteCatalog};
use stowage_core::{AppIdentity, EPOCH, EngineConfig, OperationKind, StatusEvent};
use stowage_storage::ScopedDir;
use stowage_storage::paths::{self, is_acceptable_file_path};
use stowage_storage::space;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

/// Configuration plus the catalog handle it produced.
pub(crate) struct Runtime {
    pub config: EngineConfig,
    pub catalog: SqliteCatalog,
}

impl Runtime {
    pub(crate) fn apps_epoch_dir(&self) -> PathBuf {
        Path::new(&self.config.apps_path).join(EPOCH)
    }

    pub(crate) fn data_epoch_dir(&self) -> PathBuf {
        Path::new(&self.config.data_path).join(EPOCH)
    }
}

/// Bundle directory sub-path inside the apps root.
pub(crate) fn app_sub_path(id: &str, version: &str) -> String {
    format!("{EPOCH}/{id}/{version}/")
}

/// Persistent data sub-path inside the data root. Keyed by id only so an
/// app's data survives version changes.
pub(crate) fn data_sub_path(id: &str) -> String {
    format!("{EPOCH}/{id}/")
}

pub(crate) struct ExecutorState {
    pub runtime: Option<Arc<Runtime>>,
    pub current: Option<Task>,
    pub worker: Option<JoinHandle<()>>,
    pub locks: LockRegistry,
}

/// Sizes and verbatim paths reported for quota monitoring.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct StorageDetails {
    #[serde(rename = "appPath")]
    pub app_path: String,
    #[serde(rename = "appUsedKB")]
    pub app_used_kb: u64,
    #[serde(rename = "persistentPath")]
    pub persistent_path: String,
    #[serde(rename = "persistentUsedKB")]
    pub persistent_used_kb: u64,
}

/// The installation engine.
///
/// One mutex guards the current task, the lock registry and the progress
/// field; it is never held across download, extraction or catalog I/O.
/// At most one background worker runs at a time; every other entry point
/// executes on the caller's task.
pub struct Executor {
    state: Arc<Mutex<ExecutorState>>,
    events: broadcast::Sender<StatusEvent>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            state: Arc::new(Mutex::new(ExecutorState {
                runtime: None,
                current: None,
                worker: None,
                locks: LockRegistry::default(),
            })),
            events,
        }
    }

    /// Subscribe to the `operationStatus` event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Apply configuration: create the epoch directories, sweep stale
    /// epochs, open the catalog and run a maintenance pass.
    pub async fn configure(&self, config: EngineConfig) -> EngineResult<()> {
        let config = config.normalize();

        {
            let state = self.state.lock().await;
            if state.current.is_some() {
                return Err(EngineError::TooManyRequests);
            }
        }

        paths::create_directory(Path::new(&config.apps_path).join(EPOCH))?;
        paths::create_directory(Path::new(&config.data_path).join(EPOCH))?;
        paths::remove_all_directories_except(&config.apps_path, EPOCH)?;
        paths::remove_all_directories_except(&config.data_path, EPOCH)?;

        let db_dir = Path::new(&config.db_path).join(EPOCH);
        let mut scoped_db = ScopedDir::new(&db_dir)?;
        let catalog = SqliteCatalog::open(db_dir.join("apps.db"))
            .await
            .map_err(|e| EngineError::General(format!("unable to open catalog: {e}")))?;
        scoped_db.commit();

        let runtime = Arc::new(Runtime { config, catalog });
        self.state.lock().await.runtime = Some(runtime.clone());

        reconcile::run(&runtime).await;
        tracing::info!("configuration done");
        Ok(())
    }

    async fn runtime(&self) -> EngineResult<Arc<Runtime>> {
        self.state
            .lock()
            .await
            .runtime
            .clone()
            .ok_or_else(|| EngineError::General("executor is not configured".to_string()))
    }

    /// Schedule a bundle installation. Returns the task handle.
    pub async fn install(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        url: &str,
        app_name: &str,
        category: &str,
    ) -> EngineResult<String> {
        tracing::info!(app_type = %app_type, id = %id, version = %version, url = %url, "install requested");

        if app_type.is_empty() {
            return Err(EngineError::WrongParams("type must not be empty".to_string()));
        }
        if !is_acceptable_file_path(id) {
            return Err(EngineError::WrongParams(format!("invalid id: '{id}'")));
        }
        if !is_acceptable_file_path(version) {
            return Err(EngineError::WrongParams(format!("invalid version: '{version}'")));
        }
        if url.is_empty() {
            return Err(EngineError::WrongParams("url must not be empty".to_string()));
        }

        let runtime = self.runtime().await?;
        if runtime.catalog.is_app_installed(app_type, id, version).await? {
            return Err(EngineError::AlreadyInstalled);
        }
        match runtime.catalog.type_of_app(id).await {
            Ok(registered) if registered != app_type => {
                return Err(EngineError::WrongParams(format!(
                    "id '{id}' is already registered with type '{registered}'"
                )));
            }
            Ok(_) | Err(CatalogError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let identity = AppIdentity::new(app_type, id, version);
        let operation = Operation::Install {
            url: url.to_string(),
            app_name: app_name.to_string(),
            category: category.to_string(),
        };
        self.schedule(runtime, identity, OperationKind::Installing, operation)
            .await
    }

    /// Schedule an uninstall. `uninstall_type` is `"full"` (drop the app
    /// and its persistent data once no version remains) or `"upgrade"`
    /// (keep the data for the next version).
    pub async fn uninstall(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        uninstall_type: &str,
    ) -> EngineResult<String> {
        tracing::info!(app_type = %app_type, id = %id, version = %version, uninstall_type = %uninstall_type, "uninstall requested");

        if uninstall_type != "full" && uninstall_type != "upgrade" {
            return Err(EngineError::WrongParams(format!(
                "invalid uninstall type: '{uninstall_type}'"
            )));
        }
        if app_type.is_empty() || !is_acceptable_file_path(id) {
            return Err(EngineError::WrongParams("invalid type or id".to_string()));
        }
        if !version.is_empty() && !is_acceptable_file_path(version) {
            return Err(EngineError::WrongParams(format!("invalid version: '{version}'")));
        }

        let runtime = self.runtime().await?;
        let mode = if !version.is_empty()
            && runtime.catalog.is_app_installed(app_type, id, version).await?
        {
            UninstallMode::Version
        } else if version.is_empty()
            && uninstall_type == "full"
            && runtime.catalog.is_app_data(app_type, id).await?
            && runtime.catalog.installed_versions(app_type, id).await?.is_empty()
        {
            // Residual persistent storage with no version left installed.
            UninstallMode::DataOnly
        } else {
            return Err(EngineError::WrongParams(format!(
                "app not installed: {app_type}:{id}:{version}"
            )));
        };

        let identity = AppIdentity::new(app_type, id, version);
        {
            let state = self.state.lock().await;
            if state.locks.contains(&identity) {
                return Err(EngineError::AppLocked);
            }
        }

        let operation = Operation::Uninstall {
            uninstall_type: uninstall_type.to_string(),
            mode,
        };
        self.schedule(runtime, identity, OperationKind::Uninstalling, operation)
            .await
    }

    async fn schedule(
        &self,
        runtime: Arc<Runtime>,
        identity: AppIdentity,
        kind: OperationKind,
        operation: Operation,
    ) -> EngineResult<String> {
        let mut state = self.state.lock().await;
        if state.current.is_some() {
            return Err(EngineError::TooManyRequests);
        }

        let handle = task::generate_handle();
        state.current = Some(Task {
            handle: handle.clone(),
            kind,
            identity: identity.clone(),
            progress: 0,
            cancelled: false,
        });

        let ctx = WorkerCtx {
            state: self.state.clone(),
            events: self.events.clone(),
            runtime,
            handle: handle.clone(),
            identity,
            kind,
        };
        state.worker = Some(tokio::spawn(worker::run(ctx, operation)));

        tracing::info!(handle = %handle, operation = kind.as_str(), "task scheduled");
        Ok(handle)
    }

    /// Cancel the task identified by `handle`.
    ///
    /// Allowed only while the download stage is running; afterwards the
    /// operation runs to completion. Synchronous: waits for the worker to
    /// finish before returning.
    pub async fn cancel(&self, handle: &str) -> EngineResult<()> {
        let join = {
            let mut state = self.state.lock().await;
            let Some(current) = state.current.as_mut() else {
                return Err(EngineError::WrongParams("no task in progress".to_string()));
            };
            if current.handle != handle {
                return Err(EngineError::WrongParams(format!("unknown handle: {handle}")));
            }
            if current.progress >= STAGE_BASE[Stage::Extracting as usize] {
                return Err(EngineError::WrongParams(
                    "operation can no longer be cancelled".to_string(),
                ));
            }
            current.cancelled = true;
            state.worker.take()
        };

        if let Some(join) = join {
            let _ = join.await;
        }
        tracing::info!(handle = %handle, "cancel completed");
        Ok(())
    }

    /// Aggregate progress (0-100) of the task identified by `handle`.
    pub async fn progress(&self, handle: &str) -> EngineResult<u32> {
        let state = self.state.lock().await;
        match &state.current {
            Some(current) if current.handle == handle => Ok(current.progress),
            _ => Err(EngineError::WrongParams(format!("unknown handle: {handle}"))),
        }
    }

    /// Take an advisory lock on an installed app, blocking its uninstall.
    pub async fn lock(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        reason: &str,
        owner: &str,
    ) -> EngineResult<String> {
        if app_type.is_empty() || id.is_empty() || version.is_empty() {
            return Err(EngineError::WrongParams(
                "type, id and version must not be empty".to_string(),
            ));
        }

        let runtime = self.runtime().await?;
        if !runtime.catalog.is_app_installed(app_type, id, version).await? {
            return Err(EngineError::WrongParams(format!(
                "app not installed: {app_type}:{id}:{version}"
            )));
        }

        let identity = AppIdentity::new(app_type, id, version);
        let mut state = self.state.lock().await;
        if let Some(current) = &state.current
            && current.identity == identity
        {
            return Err(EngineError::AppUninstalling);
        }
        if state.locks.contains(&identity) {
            return Err(EngineError::AppLocked);
        }

        let handle = task::generate_handle();
        state.locks.insert(
            identity,
            LockInfo {
                reason: reason.to_string(),
                owner: owner.to_string(),
            },
            handle.clone(),
        );
        Ok(handle)
    }

    /// Release the lock identified by `handle`.
    pub async fn unlock(&self, handle: &str) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        if state.locks.remove_by_handle(handle) {
            Ok(())
        } else {
            Err(EngineError::WrongHandle)
        }
    }

    /// Reason and owner of the lock on (type, id, version).
    pub async fn lock_info(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> EngineResult<LockInfo> {
        let identity = AppIdentity::new(app_type, id, version);
        let state = self.state.lock().await;
        state
            .locks
            .get(&identity)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| {
                EngineError::WrongParams(format!("not locked: {app_type}:{id}:{version}"))
            })
    }

    /// Storage usage report.
    ///
    /// With all of type/id/version empty: totals for the apps root (plus
    /// the download area) and the data root. With an id: per-app figures,
    /// the bundle size only when a version is given, the persistent size
    /// always.
    pub async fn storage_details(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> EngineResult<StorageDetails> {
        let runtime = self.runtime().await?;
        let config = &runtime.config;

        if id.is_empty() {
            if !app_type.is_empty() || !version.is_empty() {
                return Err(EngineError::WrongParams(
                    "id is required when type or version is set".to_string(),
                ));
            }

            let apps_path = config.apps_path.clone();
            let tmp_path = config.apps_tmp_path();
            let data_path = config.data_path.clone();
            let (app_bytes, data_bytes) = tokio::task::spawn_blocking(move || {
                let app = space::directory_space(&apps_path)?
                    + space::directory_space(&tmp_path)?;
                let data = space::directory_space(&data_path)?;
                Ok::<_, stowage_storage::StorageError>((app, data))
            })
            .await
            .map_err(|e| EngineError::General(e.to_string()))??;

            return Ok(StorageDetails {
                app_path: config.apps_path.clone(),
                app_used_kb: app_bytes / 1024,
                persistent_path: config.data_path.clone(),
                persistent_used_kb: data_bytes / 1024,
            });
        }

        let mut details = StorageDetails::default();

        if !version.is_empty() {
            if !runtime.catalog.is_app_installed(app_type, id, version).await? {
                return Err(EngineError::WrongParams(format!(
                    "app not installed: {app_type}:{id}:{version}"
                )));
            }
            let subs = runtime.catalog.apps_paths(app_type, id, version).await?;
            let (bytes, last) = sum_paths(&config.apps_path, subs).await?;
            details.app_used_kb = bytes / 1024;
            details.app_path = last;
        }

        let subs = runtime.catalog.data_paths(app_type, id).await?;
        let (bytes, last) = sum_paths(&config.data_path, subs).await?;
        details.persistent_used_kb = bytes / 1024;
        details.persistent_path = last;

        Ok(details)
    }

    /// List apps with their installed versions. Apps that only have
    /// persistent data left are included with empty version fields.
    pub async fn app_details_list(&self, filters: &ListFilters) -> EngineResult<Vec<AppDetails>> {
        let runtime = self.runtime().await?;
        Ok(runtime.catalog.app_details_list_outer(filters).await?)
    }

    /// Set one auxiliary metadata key on an installed version.
    pub async fn set_metadata(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        key: &str,
        value: &str,
    ) -> EngineResult<()> {
        if key.is_empty() {
            return Err(EngineError::WrongParams("key must not be empty".to_string()));
        }
        let runtime = self.runtime().await?;
        match runtime.catalog.set_metadata(app_type, id, version, key, value).await {
            Ok(()) => Ok(()),
            Err(CatalogError::NotFound(m)) => Err(EngineError::WrongParams(m)),
            Err(e) => Err(e.into()),
        }
    }

    /// Clear one metadata key, or every key when `key` is empty.
    pub async fn clear_metadata(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        key: &str,
    ) -> EngineResult<()> {
        let runtime = self.runtime().await?;
        match runtime.catalog.clear_metadata(app_type, id, version, key).await {
            Ok(()) => Ok(()),
            Err(CatalogError::NotFound(m)) => Err(EngineError::WrongParams(m)),
            Err(e) => Err(e.into()),
        }
    }

    /// App details plus all metadata key/value pairs of a version.
    pub async fn metadata(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> EngineResult<(AppDetails, Vec<(String, String)>)> {
        let runtime = self.runtime().await?;
        match runtime.catalog.metadata(app_type, id, version).await {
            Ok(result) => Ok(result),
            Err(CatalogError::NotFound(m)) => Err(EngineError::WrongParams(m)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Sum the on-disk sizes of `root`-relative sub-paths, returning the last
/// full path seen (there is one per app in practice).
async fn sum_paths(root: &str, subs: Vec<String>) -> EngineResult<(u64, String)> {
    let root = root.to_string();
    tokio::task::spawn_blocking(move || {
        let mut total = 0u64;
        let mut last = String::new();
        for sub in subs {
            let full = format!("{root}{sub}");
            total += space::directory_space(&full)?;
            last = full;
        }
        Ok::<_, stowage_storage::StorageError>((total, last))
    })
    .await
    .map_err(|e| EngineError::General(e.to_string()))?
    .map_err(Into::into)
}
