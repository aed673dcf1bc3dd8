//! Directory helpers.

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// True iff every character of `s` is in `[A-Za-z0-9._-]`.
pub fn is_acceptable_file_path(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Create `path` and any missing parents.
pub fn create_directory(path: impl AsRef<Path>) -> StorageResult<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|e| StorageError::io(path.display().to_string(), e))
}

/// Create `path` recursively, setting group ownership and permissions on
/// every component this call created.
///
/// New components get owner rwx and group r-x, plus group w when
/// `writable` is set. Pre-existing components are left untouched.
pub fn create_directory_with_group(
    path: impl AsRef<Path>,
    gid: u32,
    writable: bool,
) -> StorageResult<()> {
    let path = path.as_ref();
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        if current.as_os_str().is_empty() || current.exists() {
            continue;
        }
        fs::create_dir(&current).map_err(|e| StorageError::io(current.display().to_string(), e))?;
        apply_group(&current, gid, writable)?;
    }
    Ok(())
}

fn apply_group(path: &Path, gid: u32, writable: bool) -> StorageResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::os::unix::fs::chown(path, None, Some(gid))
        .map_err(|e| StorageError::io(path.display().to_string(), e))?;
    let mode = if writable { 0o770 } else { 0o750 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| StorageError::io(path.display().to_string(), e))
}

/// Remove `path` recursively; a missing path is not an error.
pub fn remove_directory(path: impl AsRef<Path>) -> StorageResult<()> {
    let path = path.as_ref();
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path.display().to_string(), e)),
    }
}

/// Remove every immediate subdirectory of `root` except the one named
/// `keep`. Used for the epoch sweep at configure time.
pub fn remove_all_directories_except(root: impl AsRef<Path>, keep: &str) -> StorageResult<()> {
    let root = root.as_ref();
    for name in subdirectories(root)? {
        if name != keep {
            tracing::info!(root = %root.display(), dir = %name, "removing stale directory");
            remove_directory(root.join(&name))?;
        }
    }
    Ok(())
}

/// Names of the immediate subdirectories of `path`. A missing `path`
/// yields an empty list.
pub fn subdirectories(path: impl AsRef<Path>) -> StorageResult<Vec<String>> {
    let path = path.as_ref();
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(path.display().to_string(), e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| StorageError::io(entry.path().display().to_string(), e))?;
        if file_type.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// True when `path` exists and contains no entries.
pub fn is_empty_directory(path: impl AsRef<Path>) -> StorageResult<bool> {
    let path = path.as_ref();
    let mut entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
    };
    Ok(entries.next().is_none())
}

/// Apply group ownership and permissions to `path` and everything below.
pub fn set_permissions_recursively(
    path: impl AsRef<Path>,
    gid: u32,
    writable: bool,
) -> StorageResult<()> {
    let path = path.as_ref();
    apply_group(path, gid, writable)?;
    for entry in
        fs::read_dir(path).map_err(|e| StorageError::io(path.display().to_string(), e))?
    {
        let entry = entry.map_err(|e| StorageError::io(path.display().to_string(), e))?;
        let entry_path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| StorageError::io(entry_path.display().to_string(), e))?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            set_permissions_recursively(&entry_path, gid, writable)?;
        } else {
            std::os::unix::fs::chown(&entry_path, None, Some(gid))
                .map_err(|e| StorageError::io(entry_path.display().to_string(), e))?;
        }
    }
    Ok(())
}
