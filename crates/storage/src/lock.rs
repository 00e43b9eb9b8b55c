//! Advisory locking for the shared metadata file.
//!
//! A guard holds an exclusive `fs2` lock on `<file>.lock` for the duration
//! of one read-modify-write cycle. The lock is released when the guard is
//! dropped (closing the handle unlocks it).

use crate::StoreError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileLock {
    _file: File,
    lock_path: PathBuf,
}

impl FileLock {
    /// Block until the lock for `target` is held.
    pub fn acquire(target: &Path) -> Result<Self, StoreError> {
        let lock_path = lock_path_for(target);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Lock {
                path: lock_path.clone(),
                source,
            })?;
        file.lock_exclusive().map_err(|source| StoreError::Lock {
            path: lock_path.clone(),
            source,
        })?;
        debug!("acquired metadata lock {}", lock_path.display());
        Ok(Self {
            _file: file,
            lock_path,
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        debug!("released metadata lock {}", self.lock_path.display());
    }
}

/// `/a/projects_metadata.json` -> `/a/projects_metadata.json.lock`
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "metadata".into());
    name.push(".lock");
    target.with_file_name(name)
}
