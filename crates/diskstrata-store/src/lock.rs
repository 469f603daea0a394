//! Cross-process scan lock.
//!
//! The engine only keeps one scan in flight per process. Processes sharing a
//! database file take an exclusive lock on `<db>.lock` before scanning or
//! recovering stale scans, so a live scan is never marked cancelled under
//! its owner.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Exclusive lock on a database's scan lock file, released on drop.
pub struct ScanLock {
    _file: File,
    path: PathBuf,
}

impl ScanLock {
    /// Take the lock for the database at `db_path` without waiting.
    ///
    /// Fails with [`StoreError::Locked`] when another process holds it.
    pub fn try_acquire(db_path: &Path) -> StoreResult<Self> {
        let path = lock_path_for(db_path);
        let io_error = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error)?;

        // Qualified so newer toolchains do not pick `File::try_lock_exclusive`.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("Acquired scan lock {}", path.display());
                Ok(Self { _file: file, path })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(StoreError::Locked {
                path: db_path.to_path_buf(),
            }),
            Err(e) => Err(io_error(e)),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        // Closing the file releases the lock.
        debug!("Releasing scan lock {}", self.path.display());
    }
}

impl std::fmt::Debug for ScanLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanLock").field("path", &self.path).finish()
    }
}

/// Lock file path for a database: `snap.db` becomes `snap.db.lock`.
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
