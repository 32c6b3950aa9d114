//! Cross-process advisory lock guarding commits in lock coordination mode.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use traj_core::{ErrorInfo, TrajError};

/// Exclusive hold on `<store><suffix>`; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn lock_path(store: &Path, suffix: &str) -> PathBuf {
        let mut raw: OsString = store.as_os_str().to_owned();
        raw.push(suffix);
        PathBuf::from(raw)
    }

    fn open(path: &Path) -> Result<File, TrajError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| {
                TrajError::Storage(
                    ErrorInfo::new("traj_store.lock_open", err.to_string())
                        .with_context("path", path.display().to_string()),
                )
            })
    }

    /// Blocks until the lock is held.
    pub fn acquire(store: &Path, suffix: &str) -> Result<Self, TrajError> {
        let path = Self::lock_path(store, suffix);
        let file = Self::open(&path)?;
        file.lock_exclusive().map_err(|err| {
            TrajError::Storage(
                ErrorInfo::new("traj_store.lock_acquire", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Ok(Self { file, path })
    }

    /// Returns `None` when another holder owns the lock.
    pub fn try_acquire(store: &Path, suffix: &str) -> Result<Option<Self>, TrajError> {
        let path = Self::lock_path(store, suffix);
        let file = Self::open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(_) => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
