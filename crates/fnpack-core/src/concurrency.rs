use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive hold on a distribution root for the duration of a run.
pub struct DistLock {
    lock_file: File,
}

impl DistLock {
    /// Take the lock or fail immediately if another run holds it.
    pub fn try_acquire(lock_path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { lock_file: file }),
            Err(_) => Err(CoreError::Lock(lock_path.display().to_string())),
        }
    }
}

impl Drop for DistLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Worker count for a requested concurrency limit; zero means serial.
pub fn effective_workers(limit: usize) -> usize {
    limit.max(1)
}
