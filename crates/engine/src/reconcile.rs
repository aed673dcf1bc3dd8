//! Post-operation maintenance pass.
//!
//! Restores the three-store invariant (catalog, app tree, data tree)
//! after configure, install and uninstall. Best-effort throughout: every
//! failure is logged and suppressed so a healthy steady state still
//! results from a subsequent run.

use crate::error::WorkerError;
use crate::executor::Runtime;
use std::path::Path;
use std::sync::Arc;
use stowage_storage::paths;

pub(crate) async fn run(runtime: &Arc<Runtime>) {
    tracing::debug!("maintenance pass started");

    if let Err(e) = reset_tmp(runtime) {
        tracing::warn!(error = %e, "maintenance: resetting download area failed");
    }
    if let Err(e) = sweep_app_tree(runtime).await {
        tracing::warn!(error = %e, "maintenance: app tree sweep failed");
    }
    if let Err(e) = sweep_data_tree(runtime).await {
        tracing::warn!(error = %e, "maintenance: data tree sweep failed");
    }
    if let Err(e) = heal_catalog(runtime).await {
        tracing::warn!(error = %e, "maintenance: catalog healing failed");
    }
    if let Err(e) = apply_ownership(runtime).await {
        tracing::warn!(error = %e, "maintenance: ownership pass failed");
    }

    tracing::debug!("maintenance pass done");
}

/// Recreate the download area empty.
fn reset_tmp(runtime: &Runtime) -> Result<(), WorkerError> {
    let tmp = runtime.config.apps_tmp_path();
    paths::remove_directory(&tmp)?;
    paths::create_directory(&tmp)?;
    Ok(())
}

/// Delete bundle directories that are empty or unknown to the catalog.
async fn sweep_app_tree(runtime: &Runtime) -> Result<(), WorkerError> {
    let apps_epoch = runtime.apps_epoch_dir();

    for id in paths::subdirectories(&apps_epoch)? {
        let id_dir = apps_epoch.join(&id);
        for version in paths::subdirectories(&id_dir)? {
            let version_dir = id_dir.join(&version);
            let empty = paths::is_empty_directory(&version_dir)?;
            let known = runtime.catalog.has_installed_version(&id, &version).await?;
            if empty || !known {
                tracing::info!(id = %id, version = %version, "removing orphaned bundle directory");
                paths::remove_directory(&version_dir)?;
            }
        }
        if paths::is_empty_directory(&id_dir)? {
            paths::remove_directory(&id_dir)?;
        }
    }
    Ok(())
}

/// Delete data directories that are empty or belong to no registered app.
async fn sweep_data_tree(runtime: &Runtime) -> Result<(), WorkerError> {
    let data_epoch = runtime.data_epoch_dir();

    for id in paths::subdirectories(&data_epoch)? {
        let id_dir = data_epoch.join(&id);
        let known = match runtime.catalog.type_of_app(&id).await {
            Ok(_) => true,
            Err(stowage_catalog::CatalogError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        if paths::is_empty_directory(&id_dir)? || !known {
            tracing::info!(id = %id, "removing orphaned data directory");
            paths::remove_directory(&id_dir)?;
        }
    }
    Ok(())
}

/// Drop installed rows whose bundle tree is gone and recreate missing
/// data directories for registered apps.
async fn heal_catalog(runtime: &Runtime) -> Result<(), WorkerError> {
    for installed in runtime.catalog.all_installed().await? {
        let app_dir = Path::new(&runtime.config.apps_path).join(&installed.app_path);
        let missing = !app_dir.is_dir();
        if missing || paths::is_empty_directory(&app_dir)? {
            tracing::info!(
                id = %installed.app_id,
                version = %installed.version,
                "dropping catalog row without a bundle on disk"
            );
            runtime
                .catalog
                .remove_installed_app(&installed.app_type, &installed.app_id, &installed.version)
                .await?;
        }
    }

    for app in runtime.catalog.all_apps().await? {
        let data_dir = Path::new(&runtime.config.data_path).join(&app.data_path);
        if !data_dir.is_dir() {
            tracing::info!(id = %app.app_id, "recreating missing data directory");
            paths::create_directory(&data_dir)?;
        }
    }
    Ok(())
}

/// Apply group ownership recursively when configured.
async fn apply_ownership(runtime: &Runtime) -> Result<(), WorkerError> {
    let apps_gid = runtime.config.apps_group_id;
    let data_gid = runtime.config.data_group_id;
    if apps_gid.is_none() && data_gid.is_none() {
        return Ok(());
    }

    let apps_dir = runtime.apps_epoch_dir();
    let data_dir = runtime.data_epoch_dir();
    tokio::task::spawn_blocking(move || {
        if let Some(gid) = apps_gid {
            paths::set_permissions_recursively(&apps_dir, gid, false)?;
        }
        if let Some(gid) = data_gid {
            paths::set_permissions_recursively(&data_dir, gid, true)?;
        }
        Ok::<(), stowage_storage::StorageError>(())
    })
    .await
    .map_err(|e| WorkerError::Failed(e.to_string()))??;
    Ok(())
}
