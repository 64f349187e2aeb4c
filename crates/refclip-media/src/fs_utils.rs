//! Filesystem utilities for archiving source videos.
//!
//! Moves may cross filesystems (input and archive directories on different
//! mounts), so a failed hard link falls back to copy-then-delete.
//! A move never overwrites an existing file and never leaves the file in
//! both places.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{MediaError, MediaResult};

/// Move a source video into `archive_dir`, keeping its file name.
///
/// Returns the archived path. The source stays in place when the move
/// fails.
pub fn archive_source(src: impl AsRef<Path>, archive_dir: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let src = src.as_ref();
    let file_name = src
        .file_name()
        .ok_or_else(|| MediaError::internal(format!("Source has no file name: {}", src.display())))?;
    let dst = archive_dir.as_ref().join(file_name);

    move_file(src, &dst)?;

    info!(
        source = %src.display(),
        archived_to = %dst.display(),
        "Source archived"
    );
    Ok(dst)
}

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// The file is hard-linked to `dst` and the source unlinked. Linking fails
/// when `dst` exists, so an existing file is never replaced. If linking is
/// not possible (EXDEV across mounts, or a filesystem without hard links),
/// the contents are copied into a newly created `dst` and the source
/// deleted.
///
/// # Errors
///
/// - [`MediaError::FileNotFound`] if `src` does not exist
/// - [`MediaError::ArchiveConflict`] if `dst` already exists
/// - [`MediaError::Io`] if the copy or delete fails
pub fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.exists() {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    match fs::hard_link(src, dst) {
        Ok(()) => remove_source_or_rollback(src, dst, |p| fs::remove_file(p)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(MediaError::ArchiveConflict(dst.to_path_buf()))
        }
        Err(e) => {
            if is_cross_device_error(&e) {
                debug!(
                    "Cross-device move detected, falling back to copy+delete: {} -> {}",
                    src.display(),
                    dst.display()
                );
            } else {
                warn!(
                    "Hard link unavailable ({}), falling back to copy+delete: {} -> {}",
                    e,
                    src.display(),
                    dst.display()
                );
            }
            copy_and_delete(src, dst)
        }
    }
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &io::Error) -> bool {
    // EXDEV is error code 18 on Linux/macOS
    e.raw_os_error() == Some(18)
}

/// Copy file contents into a newly created `dst`, then delete the source.
///
/// `dst` is opened with `create_new`, so a file appearing there in the
/// meantime is reported as a conflict rather than overwritten.
fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let mut target = match OpenOptions::new().write(true).create_new(true).open(dst) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(MediaError::ArchiveConflict(dst.to_path_buf()));
        }
        Err(e) => return Err(MediaError::from(e)),
    };

    let copied = File::open(src)
        .and_then(|mut source| io::copy(&mut source, &mut target))
        .and_then(|_| target.sync_all());
    drop(target);

    if let Err(e) = copied {
        let _ = fs::remove_file(dst);
        error!(
            "Failed to copy file during cross-device move: {} -> {}: {}",
            src.display(),
            dst.display(),
            e
        );
        return Err(MediaError::from(e));
    }

    remove_source_or_rollback(src, dst, |p| fs::remove_file(p))?;

    debug!(
        "Successfully completed cross-device move: {} -> {}",
        src.display(),
        dst.display()
    );
    Ok(())
}

/// Delete `src` once `dst` holds the file.
///
/// If the source cannot be deleted, `dst` is removed again so the file
/// exists in exactly one place.
fn remove_source_or_rollback<F>(src: &Path, dst: &Path, remove: F) -> MediaResult<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    if let Err(e) = remove(src) {
        warn!(
            "Failed to remove source after archiving, rolling back: {}: {}",
            src.display(),
            e
        );
        if let Err(rollback) = fs::remove_file(dst) {
            error!(
                "Failed to remove archived copy during rollback: {}: {}",
                dst.display(),
                rollback
            );
        }
        return Err(MediaError::from(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");

        fs::write(&src, b"test content").unwrap();

        move_file(&src, &dst).unwrap();

        assert!(!src.exists(), "Source file should be removed");
        assert!(dst.exists(), "Destination file should exist");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "test content");
    }

    #[test]
    fn test_move_file_creates_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("used").join("source.mp4");

        fs::write(&src, b"test content").unwrap();

        move_file(&src, &dst).unwrap();

        assert!(!src.exists());
        assert!(dst.exists());
    }

    #[test]
    fn test_move_file_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");

        fs::write(&src, b"new content").unwrap();
        fs::write(&dst, b"old content").unwrap();

        let err = move_file(&src, &dst).unwrap_err();
        assert!(matches!(err, MediaError::ArchiveConflict(_)));
        assert_eq!(fs::read_to_string(&src).unwrap(), "new content");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "old content");
    }

    #[test]
    fn test_move_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = move_file(dir.path().join("missing.mp4"), dir.path().join("x.mp4")).unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[test]
    fn test_copy_and_delete() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");
        fs::write(&src, b"payload").unwrap();

        copy_and_delete(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_copy_and_delete_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");
        fs::write(&src, b"new").unwrap();
        fs::write(&dst, b"old").unwrap();

        let err = copy_and_delete(&src, &dst).unwrap_err();
        assert!(matches!(err, MediaError::ArchiveConflict(_)));
        assert_eq!(fs::read(&src).unwrap(), b"new");
        assert_eq!(fs::read(&dst).unwrap(), b"old");
    }

    #[test]
    fn test_failed_source_delete_rolls_back() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");
        fs::write(&src, b"payload").unwrap();
        fs::write(&dst, b"payload").unwrap();

        let err = remove_source_or_rollback(&src, &dst, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        })
        .unwrap_err();

        assert!(matches!(err, MediaError::Io(_)));
        assert!(src.exists(), "Source must stay in place");
        assert!(!dst.exists(), "Archived copy must be removed");
    }

    #[test]
    fn test_archive_source_keeps_name() {
        let input = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let src = input.path().join("match.mp4");
        fs::write(&src, b"video").unwrap();

        let archived = archive_source(&src, archive.path()).unwrap();

        assert_eq!(archived, archive.path().join("match.mp4"));
        assert!(!src.exists());
        assert_eq!(fs::read_dir(archive.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_is_cross_device_error() {
        let exdev_error = std::io::Error::from_raw_os_error(18);
        assert!(is_cross_device_error(&exdev_error));

        let not_found = std::io::Error::from_raw_os_error(2);
        assert!(!is_cross_device_error(&not_found));
    }
}
