//! Service configuration.

use serde::{Deserialize, Serialize};
use stowage_core::EngineConfig;

/// HTTP surface configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:9005").
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:9005".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Complete service configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP surface configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Installation engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
}
