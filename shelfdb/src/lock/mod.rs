//! Per-path write locks.
//!
//! A lock is a flag in a shared set, polled by waiters until it clears or
//! the timeout runs out. Locks only coordinate writers inside this
//! process; two processes sharing a data directory are not protected.
//! Acquisition order is not FIFO.

use crate::error::{Result, StoreError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub struct WriteLocks {
    held: Mutex<HashSet<PathBuf>>,
    poll_interval: Duration,
}

/// Holds the write lock for one path. Dropping it releases the lock, so
/// early returns and panics cannot leave a path locked.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteLockGuard<'a> {
    locks: &'a WriteLocks,
    path: PathBuf,
}

impl WriteLocks {
    pub fn new(poll_interval: Duration) -> Self {
        WriteLocks {
            held: Mutex::new(HashSet::new()),
            poll_interval,
        }
    }

    /// Wait for the lock on `path`, polling every `poll_interval`.
    pub fn acquire(&self, path: &Path, timeout: Duration) -> Result<WriteLockGuard<'_>> {
        let started = Instant::now();
        loop {
            if let Some(guard) = self.try_acquire(path) {
                return Ok(guard);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                log::warn!("Write lock timeout on {} after {:?}", path.display(), waited);
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            std::thread::sleep(self.poll_interval.min(timeout - waited));
        }
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(&self, path: &Path) -> Option<WriteLockGuard<'_>> {
        if self.set().insert(path.to_path_buf()) {
            Some(WriteLockGuard {
                locks: self,
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.set().contains(path)
    }

    fn release(&self, path: &Path) {
        self.set().remove(path);
    }

    // A panic while holding the set's mutex cannot leave it inconsistent
    // (every critical section is a single insert/remove/contains).
    fn set(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WriteLockGuard<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.path);
    }
}
