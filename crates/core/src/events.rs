//! Operation status events.

use crate::identity::AppIdentity;
use serde::Serialize;

/// Kind of background operation a task performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Installing,
    Uninstalling,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installing => "Installing",
            Self::Uninstalling => "Uninstalling",
        }
    }
}

/// Outcome reported in a status event.
///
/// A task emits any number of `Progress` events followed by exactly one of
/// `Success`, `Failed` or `Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OperationStatus {
    Success,
    Failed,
    Progress,
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Progress => "Progress",
            Self::Cancelled => "Cancelled",
        }
    }

    /// True for the three terminal statuses.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Progress)
    }
}

/// Payload of the asynchronous `operationStatus` notification.
#[derive(Clone, Debug, Serialize)]
pub struct StatusEvent {
    pub handle: String,
    pub operation: OperationKind,
    #[serde(flatten)]
    pub identity: AppIdentity,
    pub status: OperationStatus,
    /// Human-readable failure reason; empty except for `Failed`.
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(OperationStatus::Success.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(!OperationStatus::Progress.is_terminal());
    }

    #[test]
    fn event_serializes_with_flattened_identity() {
        let event = StatusEvent {
            handle: "42".to_string(),
            operation: OperationKind::Installing,
            identity: AppIdentity::new("t", "i", "v"),
            status: OperationStatus::Progress,
            details: String::new(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["operation"], "Installing");
        assert_eq!(value["type"], "t");
        assert_eq!(value["id"], "i");
        assert_eq!(value["version"], "v");
        assert_eq!(value["status"], "Progress");
    }
}
