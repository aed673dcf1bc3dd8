//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Installation engine configuration.
///
/// Every key is optional; missing keys keep the documented defaults. Path
/// values are normalized to end with `/` (see [`EngineConfig::normalize`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root for installed application bundles.
    #[serde(rename = "appspath", default = "default_apps_path")]
    pub apps_path: String,
    /// Root for the catalog database.
    #[serde(rename = "dbpath", default = "default_db_path")]
    pub db_path: String,
    /// Root for per-application persistent data.
    #[serde(rename = "datapath", default = "default_data_path")]
    pub data_path: String,
    /// File name inside an extracted bundle holding annotation key/values.
    /// Empty disables the annotations import.
    #[serde(rename = "annotationsFile", default)]
    pub annotations_file: String,
    /// Regex selecting which annotation keys are imported as metadata.
    #[serde(rename = "annotationsRegex", default)]
    pub annotations_regex: String,
    /// Wait between download retries when the server answers 202 Accepted.
    /// A `Retry-After` response header overrides this at runtime.
    #[serde(rename = "downloadRetryAfterSeconds", default = "default_retry_after_secs")]
    pub download_retry_after_seconds: u32,
    /// How many 202 retries before the download fails.
    #[serde(rename = "downloadRetryMaxTimes", default = "default_retry_max_times")]
    pub download_retry_max_times: u32,
    /// Wall-clock cap on a single download attempt.
    #[serde(rename = "downloadTimeoutSeconds", default = "default_timeout_secs")]
    pub download_timeout_seconds: u32,
    /// Group id applied recursively to the apps tree during maintenance.
    #[serde(rename = "appsGroupId", default)]
    pub apps_group_id: Option<u32>,
    /// Group id applied recursively to the data tree during maintenance.
    #[serde(rename = "dataGroupId", default)]
    pub data_group_id: Option<u32>,
}

fn default_apps_path() -> String {
    "/mnt/apps/dac/images/".to_string()
}

fn default_db_path() -> String {
    "/mnt/apps/dac/db/".to_string()
}

fn default_data_path() -> String {
    "/mnt/data/dac/".to_string()
}

fn default_retry_after_secs() -> u32 {
    30
}

fn default_retry_max_times() -> u32 {
    4
}

fn default_timeout_secs() -> u32 {
    900
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apps_path: default_apps_path(),
            db_path: default_db_path(),
            data_path: default_data_path(),
            annotations_file: String::new(),
            annotations_regex: String::new(),
            download_retry_after_seconds: default_retry_after_secs(),
            download_retry_max_times: default_retry_max_times(),
            download_timeout_seconds: default_timeout_secs(),
            apps_group_id: None,
            data_group_id: None,
        }
    }
}

fn ensure_trailing_slash(s: &mut String) {
    if !s.is_empty() && !s.ends_with('/') {
        s.push('/');
    }
}

impl EngineConfig {
    /// Normalize all path values to end with `/`.
    pub fn normalize(mut self) -> Self {
        ensure_trailing_slash(&mut self.apps_path);
        ensure_trailing_slash(&mut self.db_path);
        ensure_trailing_slash(&mut self.data_path);
        self
    }

    /// Temporary download area under the apps root.
    pub fn apps_tmp_path(&self) -> String {
        format!("{}tmp/", self.apps_path)
    }

    /// Download retry interval as a [`Duration`].
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(u64::from(self.download_retry_after_seconds))
    }

    /// Download timeout as a [`Duration`].
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.download_timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.apps_path, "/mnt/apps/dac/images/");
        assert_eq!(config.db_path, "/mnt/apps/dac/db/");
        assert_eq!(config.data_path, "/mnt/data/dac/");
        assert_eq!(config.download_retry_after_seconds, 30);
        assert_eq!(config.download_retry_max_times, 4);
        assert_eq!(config.download_timeout_seconds, 900);
        assert!(config.annotations_file.is_empty());
    }

    #[test]
    fn normalize_appends_missing_slash() {
        let config = EngineConfig {
            apps_path: "/opt/apps".to_string(),
            db_path: "/opt/db/".to_string(),
            data_path: "/opt/data".to_string(),
            ..Default::default()
        }
        .normalize();
        assert_eq!(config.apps_path, "/opt/apps/");
        assert_eq!(config.db_path, "/opt/db/");
        assert_eq!(config.data_path, "/opt/data/");
        assert_eq!(config.apps_tmp_path(), "/opt/apps/tmp/");
    }

    #[test]
    fn deserializes_from_partial_json() {
        let json = r#"{"appspath": "/tmp/a", "downloadRetryMaxTimes": 1}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.apps_path, "/tmp/a");
        assert_eq!(config.download_retry_max_times, 1);
        assert_eq!(config.download_retry_after_seconds, 30);
        assert_eq!(config.db_path, "/mnt/apps/dac/db/");
    }
}
