//! Single-writer lock on a data directory.
//!
//! The JSON stores load their documents when opened and rewrite them whole,
//! so two processes writing the same directory would overwrite each other.
//! Whoever writes holds a [`DirLock`] for as long as its stores are open.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the lock file inside a data directory.
pub const LOCK_FILE: &str = ".lock";

/// An exclusive advisory lock on a directory.
///
/// Released when dropped.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    file: File,
}

impl DirLock {
    /// Takes the lock on `dir`, failing at once if another holder has it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if the lock is held elsewhere, or an
    /// I/O error if the lock file cannot be opened.
    pub fn acquire(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(dir.display().to_string()));
        }
        debug!(path = %path.display(), "Acquired directory lock");
        Ok(Self { path, file })
    }

    /// Returns the lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        // Closing the file releases the lock as well.
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_holder_is_refused() {
        let dir = TempDir::new().unwrap();
        let first = DirLock::acquire(dir.path()).unwrap();
        assert!(first.path().ends_with(LOCK_FILE));

        let err = DirLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::Locked(_)));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        drop(DirLock::acquire(dir.path()).unwrap());
        assert!(DirLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = DirLock::acquire(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
