//! Crash-safe directory creation.

use crate::error::StorageResult;
use crate::paths::{create_directory, remove_directory};
use std::path::{Path, PathBuf};

/// A directory tree that removes itself unless committed.
///
/// On construction the outermost path component that did not yet exist is
/// recorded, then the full path is created. When the guard is dropped
/// without [`ScopedDir::commit`] having been called, that outermost
/// component is removed, undoing exactly what this guard created without
/// touching pre-existing parents.
#[derive(Debug)]
pub struct ScopedDir {
    path: PathBuf,
    to_remove: Option<PathBuf>,
    committed: bool,
}

impl ScopedDir {
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut to_remove = None;
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            if !current.as_os_str().is_empty() && !current.exists() {
                to_remove = Some(current.clone());
                break;
            }
        }

        create_directory(&path)?;

        Ok(Self {
            path,
            to_remove,
            committed: false,
        })
    }

    /// The directory this guard manages.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when construction created at least one component.
    pub fn created_anything(&self) -> bool {
        self.to_remove.is_some()
    }

    /// Keep the created directories on drop.
    pub fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Some(dir) = &self.to_remove
            && let Err(e) = remove_directory(dir)
        {
            tracing::warn!(dir = %dir.display(), error = %e, "rollback of staged directory failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rollback_removes_only_created_components() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("existing");
        std::fs::create_dir(&existing).unwrap();

        let target = existing.join("a/b/c");
        {
            let scoped = ScopedDir::new(&target).unwrap();
            assert!(target.is_dir());
            assert!(scoped.created_anything());
        }

        // The pre-existing parent survives, everything below it is gone.
        assert!(existing.is_dir());
        assert!(!existing.join("a").exists());
    }

    #[test]
    fn commit_keeps_the_tree() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b");
        {
            let mut scoped = ScopedDir::new(&target).unwrap();
            scoped.commit();
        }
        assert!(target.is_dir());
    }

    #[test]
    fn existing_path_is_not_removed_on_drop() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("keep");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("file"), b"x").unwrap();

        {
            let scoped = ScopedDir::new(&target).unwrap();
            assert!(!scoped.created_anything());
        }

        assert!(target.join("file").is_file());
    }
}
