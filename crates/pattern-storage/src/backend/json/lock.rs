//! Cross-process writer lock for a JSON store (`store.lock`).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fd_lock::RwLock;
use pattern_core::errors::StorageError;

use super::files::LOCK_FILE;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Advisory file lock. Only writers take it; readers work from the
/// in-memory image.
pub struct StoreLock {
    lock_file: RwLock<File>,
    lock_path: PathBuf,
}

impl StoreLock {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        let lock_path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StorageError::io(lock_path.display(), e))?;
        Ok(Self {
            lock_file: RwLock::new(file),
            lock_path,
        })
    }

    /// Run `f` while holding the exclusive lock, retrying the lock until
    /// `busy_timeout` elapses.
    pub fn with_write<T>(
        &mut self,
        busy_timeout: Duration,
        f: impl FnOnce() -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let deadline = Instant::now() + busy_timeout;
        loop {
            match self.lock_file.try_write() {
                Ok(_guard) => return f(),
                Err(_) if Instant::now() < deadline => std::thread::sleep(RETRY_INTERVAL),
                Err(_) => {
                    return Err(StorageError::DbBusy {
                        operation: format!("write lock on {}", self.lock_path.display()),
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}
