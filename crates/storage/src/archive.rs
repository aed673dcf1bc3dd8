//! Bundle extraction.

use flate2::read::GzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Archive extraction errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("error opening file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error while reading entry: {0}")]
    Read(std::io::Error),

    #[error("error while extracting {path}: {source}")]
    Extract {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Unpack the gzipped tar at `archive_path` into `destination`.
///
/// Entry paths are confined to the destination and hardlink targets are
/// rewritten relative to it. Permissions, modification times and extended
/// attributes are preserved. Entries skipped for safety are logged and do
/// not abort the extraction; any I/O failure aborts it.
pub async fn unpack(
    archive_path: impl AsRef<Path>,
    destination: impl AsRef<Path>,
) -> Result<(), ArchiveError> {
    let archive_path = archive_path.as_ref().to_path_buf();
    let destination = destination.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || unpack_sync(&archive_path, &destination))
        .await
        .map_err(|e| ArchiveError::Read(std::io::Error::other(e)))?
}

fn unpack_sync(archive_path: &Path, destination: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path).map_err(|e| ArchiveError::Open {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(true);

    let entries = archive.entries().map_err(ArchiveError::Read)?;
    for entry in entries {
        let mut entry = entry.map_err(ArchiveError::Read)?;
        let entry_path: PathBuf = entry
            .path()
            .map_err(ArchiveError::Read)?
            .into_owned();

        // unpack_in joins the entry path under the destination and
        // rewrites hardlink targets to stay inside it.
        let unpacked = entry.unpack_in(destination).map_err(|e| ArchiveError::Extract {
            path: entry_path.display().to_string(),
            source: e,
        })?;

        if unpacked {
            tracing::debug!(entry = %entry_path.display(), "extracted");
        } else {
            tracing::warn!(entry = %entry_path.display(), "skipped unsafe archive entry");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    fn build_bundle(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[tokio::test]
    async fn unpacks_files_under_destination() {
        let dir = tempdir().unwrap();
        let bundle = build_bundle(&[
            ("rootfs/bin/app", b"binary".as_slice()),
            ("rootfs/etc/conf", b"config".as_slice()),
        ]);
        let archive_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&archive_path, bundle).unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        unpack(&archive_path, &dest).await.unwrap();

        assert_eq!(std::fs::read(dest.join("rootfs/bin/app")).unwrap(), b"binary");
        assert_eq!(std::fs::read(dest.join("rootfs/etc/conf")).unwrap(), b"config");
    }

    #[tokio::test]
    async fn preserves_entry_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let bundle = build_bundle(&[("rootfs/bin/app", b"x".as_slice())]);
        let archive_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&archive_path, bundle).unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        unpack(&archive_path, &dest).await.unwrap();

        let mode = std::fs::metadata(dest.join("rootfs/bin/app"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn escaping_entries_are_skipped_not_extracted() {
        let dir = tempdir().unwrap();
        let bundle = build_bundle(&[("../escape", b"evil".as_slice())]);
        let archive_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&archive_path, bundle).unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        unpack(&archive_path, &dest).await.unwrap();

        assert!(!dir.path().join("escape").exists());
    }

    #[tokio::test]
    async fn missing_archive_is_an_open_error() {
        let dir = tempdir().unwrap();
        let err = unpack(dir.path().join("missing.tar.gz"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Open { .. }));
    }

    #[tokio::test]
    async fn truncated_archive_aborts_extraction() {
        let dir = tempdir().unwrap();
        let mut bundle = build_bundle(&[("rootfs/file", b"data".as_slice())]);
        bundle.truncate(bundle.len() / 2);
        let archive_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&archive_path, bundle).unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        assert!(unpack(&archive_path, &dest).await.is_err());
    }
}
