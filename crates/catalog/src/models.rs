//! Row types returned by catalog queries.

use serde::Serialize;
use sqlx::FromRow;

/// One row of the app listing, joined across `apps` and `installed_apps`.
///
/// The version-side columns are `None` for apps that only have persistent
/// data left (outer-join listing).
#[derive(Clone, Debug, FromRow, Serialize)]
pub struct AppDetails {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub app_type: String,
    #[sqlx(rename = "app_id")]
    pub id: String,
    pub version: Option<String>,
    #[sqlx(rename = "name")]
    pub app_name: Option<String>,
    pub category: Option<String>,
    pub url: Option<String>,
}

/// Registered application and its persistent-data sub-path.
#[derive(Clone, Debug, FromRow)]
pub struct AppRef {
    #[sqlx(rename = "type")]
    pub app_type: String,
    pub app_id: String,
    pub data_path: String,
}

/// Installed version and its bundle sub-path.
#[derive(Clone, Debug, FromRow)]
pub struct InstalledRef {
    #[sqlx(rename = "type")]
    pub app_type: String,
    pub app_id: String,
    pub version: String,
    pub app_path: String,
}

/// Optional filters for the listing queries; an empty string matches all.
#[derive(Clone, Debug, Default)]
pub struct ListFilters {
    pub app_type: String,
    pub id: String,
    pub version: String,
    pub app_name: String,
    pub category: String,
}
