//! Application identity.

use serde::{Deserialize, Serialize};

/// Identifies one version of one application.
///
/// `app_type` is a free-form MIME-like tag (e.g.
/// `application/vnd.rdk-app.dac.native`). `id` is unique across all types;
/// two apps may not share an id even under different types. `version` is a
/// free-form version string. `id` and `version` become path components on
/// disk and are validated before an operation is admitted; rejection is
/// the only policy, values are never silently rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppIdentity {
    #[serde(rename = "type")]
    pub app_type: String,
    pub id: String,
    pub version: String,
}

impl AppIdentity {
    pub fn new(
        app_type: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            app_type: app_type.into(),
            id: id.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for AppIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.app_type, self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_display_joins_fields() {
        let id = AppIdentity::new("t", "com.example.app", "1.0.0");
        assert_eq!(id.to_string(), "t:com.example.app:1.0.0");
    }

    #[test]
    fn identity_serializes_type_under_its_wire_name() {
        let id = AppIdentity::new("application/x", "com.example.app", "1.0.0");
        let value = serde_json::to_value(&id).unwrap();
        assert_eq!(value["type"], "application/x");
    }
}
