//! Exclusive advisory lock held for the lifetime of a sync.
//!
//! Readers (search, cat, status) never take this lock and keep seeing the
//! pre-sync state until the sync finalizes; a second concurrent sync fails
//! fast instead of queueing.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::errors::{EmberError, Result};

/// Holds `.ember/.lock` exclusively until dropped.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
}

impl SyncLock {
    /// Acquire the lock, failing fast if another sync holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| EmberError::SyncInProgress(path.to_path_buf()))?;
        Ok(Self { file })
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        // The OS releases the lock when the fd closes anyway; unlocking
        // explicitly just makes the release immediate.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
