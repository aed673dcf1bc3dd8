//! Disk space accounting.

use crate::error::{StorageError, StorageResult};
use std::ffi::CString;
use std::fs;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Bytes available to a non-privileged user on the filesystem holding
/// `path`.
pub fn free_space(path: impl AsRef<Path>) -> StorageResult<u64> {
    let path = path.as_ref();
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StorageError::InvalidPath(path.display().to_string()))?;

    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(StorageError::io(
            path.display().to_string(),
            std::io::Error::last_os_error(),
        ));
    }
    let stat = unsafe { stat.assume_init() };
    Ok(u64::from(stat.f_bavail) * u64::from(stat.f_frsize))
}

/// Recursive sum of regular file sizes under `path`. Symlinks are not
/// followed and contribute nothing; a missing path counts as zero.
pub fn directory_space(path: impl AsRef<Path>) -> StorageResult<u64> {
    let path = path.as_ref();
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StorageError::io(path.display().to_string(), e)),
    };

    if metadata.is_file() {
        return Ok(metadata.len());
    }
    if !metadata.is_dir() {
        return Ok(0);
    }

    let mut total = 0u64;
    for entry in
        fs::read_dir(path).map_err(|e| StorageError::io(path.display().to_string(), e))?
    {
        let entry = entry.map_err(|e| StorageError::io(path.display().to_string(), e))?;
        total += directory_space(entry.path())?;
    }
    Ok(total)
}
