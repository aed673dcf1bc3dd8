//! Catalog store implementation on SQLite.

use crate::error::{CatalogError, CatalogResult};
use crate::models::{AppDetails, AppRef, InstalledRef, ListFilters};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// SQLite-backed catalog.
///
/// The engine serializes mutating operations behind its task mutex; the
/// pool is additionally capped at one connection so the database never
/// sees concurrent writers.
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

/// Treat an empty filter value as "match all" (SQL NULL).
fn opt(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

impl SqliteCatalog {
    /// Open (creating if missing) the catalog database at `path`.
    ///
    /// Runs `PRAGMA integrity_check` first; a corrupt database is dropped
    /// and recreated empty. The post-operation maintenance pass then
    /// rebuilds the filesystem view accordingly.
    pub async fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Internal(e.to_string()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids "database is locked" failures.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let catalog = Self { pool };
        catalog.bootstrap().await?;
        Ok(catalog)
    }

    async fn bootstrap(&self) -> CatalogResult<()> {
        let verdict: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        if verdict != "ok" {
            tracing::error!(verdict = %verdict, "catalog failed integrity check, recreating tables");
            for table in ["metadata", "installed_apps", "apps"] {
                sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                    .execute(&self.pool)
                    .await?;
            }
        }

        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Register an installed version, creating the app row if needed.
    ///
    /// `app_path` and `data_path` are sub-paths relative to the apps and
    /// data roots.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_installed_app(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        url: &str,
        app_name: &str,
        category: &str,
        app_path: &str,
        data_path: &str,
    ) -> CatalogResult<()> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, String)> =
            sqlx::query_as("SELECT idx, type FROM apps WHERE app_id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let app_idx = match existing {
            Some((idx, existing_type)) => {
                if existing_type != app_type {
                    return Err(CatalogError::AlreadyExists(format!(
                        "id '{id}' is already registered with type '{existing_type}'"
                    )));
                }
                idx
            }
            None => {
                let result =
                    sqlx::query("INSERT INTO apps (type, app_id, data_path, created) VALUES (?, ?, ?, ?)")
                        .bind(app_type)
                        .bind(id)
                        .bind(data_path)
                        .bind(now)
                        .execute(&mut *tx)
                        .await?;
                result.last_insert_rowid()
            }
        };

        sqlx::query(
            "INSERT INTO installed_apps (app_idx, version, name, category, url, app_path, created) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(app_idx)
        .bind(version)
        .bind(app_name)
        .bind(category)
        .bind(url)
        .bind(app_path)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Whether the exact (type, id, version) is installed.
    pub async fn is_app_installed(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> CatalogResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT ia.idx FROM installed_apps ia \
             JOIN apps a ON a.idx = ia.app_idx \
             WHERE a.type = ? AND a.app_id = ? AND ia.version = ?",
        )
        .bind(app_type)
        .bind(id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// The registered type of an id, or `NotFound`.
    pub async fn type_of_app(&self, id: &str) -> CatalogResult<String> {
        let row: Option<(String,)> = sqlx::query_as("SELECT type FROM apps WHERE app_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(t,)| t)
            .ok_or_else(|| CatalogError::NotFound(format!("app id not registered: {id}")))
    }

    /// Whether an app row exists for (type, id), installed versions or not.
    pub async fn is_app_data(&self, app_type: &str, id: &str) -> CatalogResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT idx FROM apps WHERE type = ? AND app_id = ?")
                .bind(app_type)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Whether (id, version) exists as an installed version of any type.
    pub async fn has_installed_version(&self, id: &str, version: &str) -> CatalogResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT ia.idx FROM installed_apps ia \
             JOIN apps a ON a.idx = ia.app_idx \
             WHERE a.app_id = ? AND ia.version = ?",
        )
        .bind(id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// All installed versions of (type, id).
    pub async fn installed_versions(&self, app_type: &str, id: &str) -> CatalogResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT ia.version FROM installed_apps ia \
             JOIN apps a ON a.idx = ia.app_idx \
             WHERE a.type = ? AND a.app_id = ? ORDER BY ia.version",
        )
        .bind(app_type)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Remove one installed version together with its metadata rows.
    pub async fn remove_installed_app(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> CatalogResult<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT ia.idx FROM installed_apps ia \
             JOIN apps a ON a.idx = ia.app_idx \
             WHERE a.type = ? AND a.app_id = ? AND ia.version = ?",
        )
        .bind(app_type)
        .bind(id)
        .bind(version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((installed_idx,)) = row else {
            return Err(CatalogError::NotFound(format!(
                "app not installed: {app_type}:{id}:{version}"
            )));
        };

        sqlx::query("DELETE FROM metadata WHERE app_idx = ?")
            .bind(installed_idx)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM installed_apps WHERE idx = ?")
            .bind(installed_idx)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove the app row for (type, id) and anything still hanging off it.
    ///
    /// Deletion is ordered explicitly (metadata, installed versions, app)
    /// rather than relying on cascading foreign keys.
    pub async fn remove_app_data(&self, app_type: &str, id: &str) -> CatalogResult<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64,)> =
            sqlx::query_as("SELECT idx FROM apps WHERE type = ? AND app_id = ?")
                .bind(app_type)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((app_idx,)) = row else {
            return Err(CatalogError::NotFound(format!(
                "app not registered: {app_type}:{id}"
            )));
        };

        sqlx::query(
            "DELETE FROM metadata WHERE app_idx IN \
             (SELECT idx FROM installed_apps WHERE app_idx = ?)",
        )
        .bind(app_idx)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM installed_apps WHERE app_idx = ?")
            .bind(app_idx)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM apps WHERE idx = ?")
            .bind(app_idx)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Bundle sub-paths of installed versions matching the filters.
    pub async fn apps_paths(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> CatalogResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT ia.app_path FROM installed_apps ia \
             JOIN apps a ON a.idx = ia.app_idx \
             WHERE (?1 IS NULL OR a.type = ?1) \
               AND (?2 IS NULL OR a.app_id = ?2) \
               AND (?3 IS NULL OR ia.version = ?3) \
             ORDER BY a.app_id, ia.version",
        )
        .bind(opt(app_type))
        .bind(opt(id))
        .bind(opt(version))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Persistent-data sub-paths of apps matching the filters.
    pub async fn data_paths(&self, app_type: &str, id: &str) -> CatalogResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data_path FROM apps \
             WHERE (?1 IS NULL OR type = ?1) AND (?2 IS NULL OR app_id = ?2) \
             ORDER BY app_id",
        )
        .bind(opt(app_type))
        .bind(opt(id))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    /// Installed apps matching the filters (inner join: installed only).
    pub async fn app_details_list(&self, filters: &ListFilters) -> CatalogResult<Vec<AppDetails>> {
        let rows = sqlx::query_as::<_, AppDetails>(
            "SELECT a.type, a.app_id, ia.version, ia.name, ia.category, ia.url \
             FROM apps a JOIN installed_apps ia ON ia.app_idx = a.idx \
             WHERE (?1 IS NULL OR a.type = ?1) \
               AND (?2 IS NULL OR a.app_id = ?2) \
               AND (?3 IS NULL OR ia.version = ?3) \
               AND (?4 IS NULL OR ia.name = ?4) \
               AND (?5 IS NULL OR ia.category = ?5) \
             ORDER BY a.app_id, ia.version",
        )
        .bind(opt(&filters.app_type))
        .bind(opt(&filters.id))
        .bind(opt(&filters.version))
        .bind(opt(&filters.app_name))
        .bind(opt(&filters.category))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Like [`Self::app_details_list`], but apps with persistent data and
    /// no installed version are included with empty version-side columns.
    pub async fn app_details_list_outer(
        &self,
        filters: &ListFilters,
    ) -> CatalogResult<Vec<AppDetails>> {
        let rows = sqlx::query_as::<_, AppDetails>(
            "SELECT a.type, a.app_id, ia.version, ia.name, ia.category, ia.url \
             FROM apps a LEFT OUTER JOIN installed_apps ia ON ia.app_idx = a.idx \
             WHERE (?1 IS NULL OR a.type = ?1) \
               AND (?2 IS NULL OR a.app_id = ?2) \
               AND (?3 IS NULL OR ia.version = ?3) \
               AND (?4 IS NULL OR ia.name = ?4) \
               AND (?5 IS NULL OR ia.category = ?5) \
             ORDER BY a.app_id, ia.version",
        )
        .bind(opt(&filters.app_type))
        .bind(opt(&filters.id))
        .bind(opt(&filters.version))
        .bind(opt(&filters.app_name))
        .bind(opt(&filters.category))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every registered app, for the maintenance pass.
    pub async fn all_apps(&self) -> CatalogResult<Vec<AppRef>> {
        let rows = sqlx::query_as::<_, AppRef>(
            "SELECT type, app_id, data_path FROM apps ORDER BY app_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every installed version, for the maintenance pass.
    pub async fn all_installed(&self) -> CatalogResult<Vec<InstalledRef>> {
        let rows = sqlx::query_as::<_, InstalledRef>(
            "SELECT a.type, a.app_id, ia.version, ia.app_path \
             FROM installed_apps ia JOIN apps a ON a.idx = ia.app_idx \
             ORDER BY a.app_id, ia.version",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn installed_idx(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> CatalogResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT ia.idx FROM installed_apps ia \
             JOIN apps a ON a.idx = ia.app_idx \
             WHERE a.type = ? AND a.app_id = ? AND ia.version = ?",
        )
        .bind(app_type)
        .bind(id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(idx,)| idx).ok_or_else(|| {
            CatalogError::NotFound(format!("app not installed: {app_type}:{id}:{version}"))
        })
    }

    /// Set one metadata key; replaces an existing value for the same key.
    pub async fn set_metadata(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        key: &str,
        value: &str,
    ) -> CatalogResult<()> {
        let installed_idx = self.installed_idx(app_type, id, version).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO metadata (app_idx, meta_key, meta_value) VALUES (?, ?, ?)",
        )
        .bind(installed_idx)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete one metadata key, or every key when `key` is empty.
    pub async fn clear_metadata(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
        key: &str,
    ) -> CatalogResult<()> {
        let installed_idx = self.installed_idx(app_type, id, version).await?;
        if key.is_empty() {
            sqlx::query("DELETE FROM metadata WHERE app_idx = ?")
                .bind(installed_idx)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("DELETE FROM metadata WHERE app_idx = ? AND meta_key = ?")
                .bind(installed_idx)
                .bind(key)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// App details together with all metadata key/value pairs.
    pub async fn metadata(
        &self,
        app_type: &str,
        id: &str,
        version: &str,
    ) -> CatalogResult<(AppDetails, Vec<(String, String)>)> {
        let installed_idx = self.installed_idx(app_type, id, version).await?;

        let details = sqlx::query_as::<_, AppDetails>(
            "SELECT a.type, a.app_id, ia.version, ia.name, ia.category, ia.url \
             FROM installed_apps ia JOIN apps a ON a.idx = ia.app_idx \
             WHERE ia.idx = ?",
        )
        .bind(installed_idx)
        .fetch_one(&self.pool)
        .await?;

        let pairs: Vec<(String, String)> = sqlx::query_as(
            "SELECT meta_key, COALESCE(meta_value, '') FROM metadata \
             WHERE app_idx = ? ORDER BY meta_key",
        )
        .bind(installed_idx)
        .fetch_all(&self.pool)
        .await?;

        Ok((details, pairs))
    }
}

/// SQL schema. Column names are normative for interop with databases
/// written by earlier deployments.
const SCHEMA_SQL: &str = r#"
-- Registered applications; one row per (type, id). app_id is globally
-- unique: two records may not share an id even with different types.
CREATE TABLE IF NOT EXISTS apps (
    idx INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    app_id TEXT NOT NULL UNIQUE,
    data_path TEXT,
    created TEXT NOT NULL
);

-- Installed versions; removed by uninstall or by the maintenance pass
-- when the on-disk tree is absent or empty.
CREATE TABLE IF NOT EXISTS installed_apps (
    idx INTEGER PRIMARY KEY,
    app_idx INTEGER NOT NULL,
    version TEXT NOT NULL,
    name TEXT NOT NULL,
    category TEXT,
    url TEXT,
    app_path TEXT,
    created TEXT NOT NULL,
    UNIQUE(app_idx, version),
    FOREIGN KEY(app_idx) REFERENCES apps(idx)
);
CREATE INDEX IF NOT EXISTS idx_installed_apps_app ON installed_apps(app_idx);

-- Per-version auxiliary metadata, cleared with the owning version.
CREATE TABLE IF NOT EXISTS metadata (
    idx INTEGER PRIMARY KEY,
    app_idx INTEGER NOT NULL,
    meta_key TEXT NOT NULL,
    meta_value TEXT,
    UNIQUE(app_idx, meta_key),
    FOREIGN KEY(app_idx) REFERENCES installed_apps(idx)
);
"#;
