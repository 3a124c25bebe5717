//! Per-run temporary blob file and its cleanup.
//!
//! A [`ScratchFile`] lives for exactly one job run. Cleanup is explicit via
//! [`ScratchFile::cleanup`], and the `Drop` impl runs it for any exit path
//! that skipped the explicit call. Once an explicit cleanup has been attempted,
//! its outcome stands and `Drop` does nothing. Deleting a file that is already
//! gone counts as clean.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Result of a delete-if-exists call.
#[derive(Debug)]
pub enum CleanupOutcome {
    Deleted,
    AlreadyAbsent,
    Failed(io::Error),
}

impl CleanupOutcome {
    pub fn is_clean(&self) -> bool {
        !matches!(self, CleanupOutcome::Failed(_))
    }
}

/// Remove `path`, treating a missing file as already clean.
pub fn delete_if_exists(path: &Path) -> CleanupOutcome {
    match fs::remove_file(path) {
        Ok(()) => CleanupOutcome::Deleted,
        Err(e) if e.kind() == io::ErrorKind::NotFound => CleanupOutcome::AlreadyAbsent,
        Err(e) => CleanupOutcome::Failed(e),
    }
}

/// Temporary on-disk copy of a blob, scoped to one run.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    cleanup_attempted: bool,
}

impl ScratchFile {
    /// Create an empty scratch file in `dir`, or the system temp dir.
    pub fn create(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("prefix-bucket-");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        // Keep the path alive past the handle; removal is ours to manage.
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        debug!(path = %path.display(), "Created scratch file");
        Ok(Self {
            path,
            cleanup_attempted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_blob(&self, blob: &[u8]) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(blob)?;
        file.sync_all()
    }

    pub fn read_blob(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Delete the file. Safe to call more than once; the caller owns reporting a failure.
    pub fn cleanup(&mut self) -> CleanupOutcome {
        self.cleanup_attempted = true;
        delete_if_exists(&self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.cleanup_attempted {
            return;
        }
        if let CleanupOutcome::Failed(e) = self.cleanup() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let scratch = ScratchFile::create(Some(dir.path())).unwrap();
        scratch.write_blob(b"PPPP").unwrap();
        assert_eq!(scratch.read_blob().unwrap(), b"PPPP");
    }

    #[test]
    fn cleanup_twice_is_harmless() {
        let dir = tempdir().unwrap();
        let mut scratch = ScratchFile::create(Some(dir.path())).unwrap();
        let path = scratch.path().to_path_buf();

        assert!(matches!(scratch.cleanup(), CleanupOutcome::Deleted));
        assert!(matches!(scratch.cleanup(), CleanupOutcome::AlreadyAbsent));
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempdir().unwrap();
        let path = {
            let scratch = ScratchFile::create(Some(dir.path())).unwrap();
            scratch.write_blob(b"x").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn failed_cleanup_is_not_retried_on_drop() {
        let dir = tempdir().unwrap();
        let mut scratch = ScratchFile::create(Some(dir.path())).unwrap();
        let path = scratch.path().to_path_buf();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(scratch.cleanup(), CleanupOutcome::Failed(_)));
        assert!(scratch.cleanup_attempted);
        drop(scratch);
        assert!(path.is_dir());
    }

    #[test]
    fn delete_if_exists_reports_missing_file() {
        let dir = tempdir().unwrap();
        let outcome = delete_if_exists(&dir.path().join("never-created"));
        assert!(matches!(outcome, CleanupOutcome::AlreadyAbsent));
        assert!(outcome.is_clean());
    }

    #[test]
    fn delete_if_exists_surfaces_other_errors() {
        let dir = tempdir().unwrap();
        // A directory cannot be removed with remove_file.
        let outcome = delete_if_exists(dir.path());
        assert!(matches!(outcome, CleanupOutcome::Failed(_)));
    }
}
