//! Cross-process single-instance lock
//!
//! Only one mark-files run may scan and restore at a time. The guard holds an
//! exclusive advisory lock on `<temp dir>/<name>.lock` and gives it up when
//! dropped, so every exit path (including `?` returns and panics) releases it.
//! The operating system also drops the lock if the process dies.

use crate::error::{MarkError, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default lock name shared by all instances
pub const DEFAULT_LOCK_NAME: &str = "mark-files";

/// Held instance lock; released on drop
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Block until the named lock is acquired
    ///
    /// # Errors
    ///
    /// - [`MarkError::Lock`] if the lock file cannot be opened or locked
    pub fn acquire(name: &str) -> Result<Self> {
        Self::acquire_at(lock_path(name), name)
    }

    /// Block until the lock file at `path` is acquired
    pub fn acquire_at(path: PathBuf, name: &str) -> Result<Self> {
        let lock_err = |source| MarkError::Lock {
            name: name.to_string(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;
        debug!("Waiting for instance lock {:?}", path);
        file.lock().map_err(lock_err)?;
        debug!("Acquired instance lock {:?}", path);

        Ok(Self { file, path })
    }

    /// Location of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("Failed to release instance lock {:?}: {}", self.path, e);
        } else {
            debug!("Released instance lock {:?}", self.path);
        }
    }
}

/// Path of the lock file for `name`
pub fn lock_path(name: &str) -> PathBuf {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!("{}.lock", sanitized))
}
