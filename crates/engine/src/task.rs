//! The in-memory task and its progress arithmetic.

use stowage_core::{AppIdentity, OperationKind};

/// Install stages in execution order. Uninstall jumps straight to
/// `Finished`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Downloading = 0,
    Extracting = 1,
    UpdatingDatabase = 2,
    Finished = 3,
}

/// Aggregate progress at the start of each stage.
pub(crate) const STAGE_BASE: [u32; 4] = [0, 90, 95, 100];

/// Weight of each stage in the aggregate.
const STAGE_FACTOR: [f64; 4] = [0.90, 0.05, 0.05, 0.0];

/// Fold a within-stage percentage into the overall 0-100 progress value.
pub(crate) fn aggregate_progress(stage: Stage, stage_percent: u32) -> u32 {
    let idx = stage as usize;
    STAGE_BASE[idx] + (f64::from(stage_percent.min(100)) * STAGE_FACTOR[idx]) as u32
}

/// The single in-flight background operation.
#[derive(Debug)]
pub(crate) struct Task {
    pub handle: String,
    pub kind: OperationKind,
    pub identity: AppIdentity,
    pub progress: u32,
    pub cancelled: bool,
}

/// Allocate an opaque task or lock handle: a uniformly random 64-bit
/// value from the process CSPRNG, rendered as a decimal string.
pub(crate) fn generate_handle() -> String {
    use rand::Rng;
    rand::rng().random::<u64>().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_boundaries() {
        assert_eq!(aggregate_progress(Stage::Downloading, 0), 0);
        assert_eq!(aggregate_progress(Stage::Downloading, 50), 45);
        assert_eq!(aggregate_progress(Stage::Downloading, 100), 90);
        assert_eq!(aggregate_progress(Stage::Extracting, 0), 90);
        assert_eq!(aggregate_progress(Stage::Extracting, 100), 95);
        assert_eq!(aggregate_progress(Stage::UpdatingDatabase, 0), 95);
        assert_eq!(aggregate_progress(Stage::UpdatingDatabase, 100), 100);
        assert_eq!(aggregate_progress(Stage::Finished, 0), 100);
    }

    #[test]
    fn aggregate_is_clamped_to_valid_range() {
        assert_eq!(aggregate_progress(Stage::Downloading, 200), 90);
        assert_eq!(aggregate_progress(Stage::Finished, 100), 100);
    }

    #[test]
    fn handles_are_decimal_and_unique_enough() {
        let a = generate_handle();
        let b = generate_handle();
        assert!(a.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(a, b);
    }
}
