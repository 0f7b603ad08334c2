//! Optional in-memory read cache.
//!
//! Holds the last known-good value per document path for a fixed TTL.
//! Writes go through the cache; loads only fill it if no write or
//! invalidation happened since the load observed the generation, so a
//! slow reader cannot put back a value older than the file.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

pub struct DocumentCache {
    ttl: Duration,
    slots: RwLock<HashMap<PathBuf, Slot>>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    cached: Option<CachedDocument>,
}

struct CachedDocument {
    data: Value,
    stored_at: Instant,
}

impl DocumentCache {
    pub fn new(ttl: Duration) -> Self {
        DocumentCache {
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh cached value for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<Value> {
        self.read()
            .get(path)
            .and_then(|s| s.cached.as_ref())
            .filter(|c| c.stored_at.elapsed() < self.ttl)
            .map(|c| c.data.clone())
    }

    /// Current generation for `path`. Capture before reading the file and
    /// hand it back to `fill`.
    pub fn generation(&self, path: &Path) -> u64 {
        self.read().get(path).map(|s| s.generation).unwrap_or(0)
    }

    /// Cache a value read from disk, unless the path changed since
    /// `seen` was taken. Returns whether the value was stored.
    pub fn fill(&self, path: &Path, data: Value, seen: u64) -> bool {
        let mut slots = self.write();
        let slot = slots.entry(path.to_path_buf()).or_default();
        if slot.generation != seen {
            return false;
        }
        slot.cached = Some(CachedDocument {
            data,
            stored_at: Instant::now(),
        });
        true
    }

    /// Record a value that was just written to disk.
    pub fn put(&self, path: &Path, data: Value) {
        let mut slots = self.write();
        let slot = slots.entry(path.to_path_buf()).or_default();
        slot.generation += 1;
        slot.cached = Some(CachedDocument {
            data,
            stored_at: Instant::now(),
        });
    }

    pub fn invalidate(&self, path: &Path) {
        let mut slots = self.write();
        let slot = slots.entry(path.to_path_buf()).or_default();
        slot.generation += 1;
        slot.cached = None;
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, Slot>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, Slot>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }
}
