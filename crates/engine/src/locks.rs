//! Advisory lock registry.

use std::collections::HashMap;
use stowage_core::AppIdentity;

/// What a lock holder recorded when taking the lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockInfo {
    pub reason: String,
    pub owner: String,
}

#[derive(Clone, Debug)]
pub(crate) struct LockEntry {
    pub info: LockInfo,
    pub handle: String,
}

/// In-memory map from (type, id, version) to the lock holder.
///
/// Locks are advisory and lost on restart by design; the registry lives
/// behind the executor mutex and needs no synchronization of its own.
#[derive(Debug, Default)]
pub(crate) struct LockRegistry {
    entries: HashMap<AppIdentity, LockEntry>,
}

impl LockRegistry {
    pub fn contains(&self, identity: &AppIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn get(&self, identity: &AppIdentity) -> Option<&LockEntry> {
        self.entries.get(identity)
    }

    pub fn insert(&mut self, identity: AppIdentity, info: LockInfo, handle: String) {
        self.entries.insert(identity, LockEntry { info, handle });
    }

    /// Remove the entry holding `handle`; false when no entry matches.
    pub fn remove_by_handle(&mut self, handle: &str) -> bool {
        let key = self
            .entries
            .iter()
            .find(|(_, entry)| entry.handle == handle)
            .map(|(identity, _)| identity.clone());
        match key {
            Some(identity) => {
                self.entries.remove(&identity);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> AppIdentity {
        AppIdentity::new("t", "com.example.app", "1.0.0")
    }

    #[test]
    fn insert_and_lookup() {
        let mut registry = LockRegistry::default();
        assert!(!registry.contains(&identity()));

        registry.insert(
            identity(),
            LockInfo {
                reason: "debugging".to_string(),
                owner: "tester".to_string(),
            },
            "123".to_string(),
        );

        assert!(registry.contains(&identity()));
        assert_eq!(registry.get(&identity()).unwrap().info.reason, "debugging");
    }

    #[test]
    fn remove_requires_matching_handle() {
        let mut registry = LockRegistry::default();
        registry.insert(
            identity(),
            LockInfo {
                reason: "r".to_string(),
                owner: "o".to_string(),
            },
            "123".to_string(),
        );

        assert!(!registry.remove_by_handle("456"));
        assert!(registry.contains(&identity()));
        assert!(registry.remove_by_handle("123"));
        assert!(!registry.contains(&identity()));
        assert!(!registry.remove_by_handle("123"));
    }
}
