use crate::backup::{
    BackupInfo, BackupManager, BackupScheduler, BackupSnapshot, BackupStatus, CleanupReport,
};
use crate::cache::DocumentCache;
use crate::config::{parse_config, StoreConfig};
use crate::document;
use crate::error::{Result, StoreError};
use crate::integrity::{self, IntegrityReport};
use crate::lock::WriteLocks;
use crate::registry::{DocumentEntry, PathRegistry};
use crate::validation;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Where a loaded value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// The document file parsed and validated
    Primary,
    /// The document was damaged; `<file>.backup` was used instead
    Backup,
    /// The document was empty, or neither copy was usable
    Default,
}

/// A loaded value tagged with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub source: LoadSource,
}

impl<T> Loaded<T> {
    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn is_clean(&self) -> bool {
        self.source == LoadSource::Primary
    }
}

/// Outcome of restoring a snapshot into the data directory
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub backup: String,
    /// Snapshot of the pre-restore state
    pub safety_backup: String,
    pub restored: Vec<String>,
    pub skipped: Vec<RestoreSkip>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreSkip {
    pub document: String,
    pub reason: String,
}

/// The main entry point for shelfdb.
/// Owns the document registry, write locks, read cache and backups for one
/// data directory. Share it between threads behind an `Arc`.
pub struct Store {
    config: StoreConfig,
    registry: PathRegistry,
    locks: WriteLocks,
    cache: Option<DocumentCache>,
    backups: Arc<BackupManager>,
}

impl Store {
    /// Open a store from a configuration.
    /// Runs the boot lifecycle: create the data directory, sweep orphaned
    /// temp files, seed missing documents.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let registry = PathRegistry::from_config(&config)?;
        let backups = Arc::new(BackupManager::new(
            config.backup_dir(),
            registry.clone(),
            config.backup.clone(),
        ));

        let store = Store {
            locks: WriteLocks::new(config.lock.poll_interval()),
            cache: config.cache.ttl().map(DocumentCache::new),
            registry,
            backups,
            config,
        };

        store.boot()?;
        Ok(store)
    }

    /// Open a store with the default configuration rooted at `data_dir`.
    pub fn open_dir(data_dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::new(data_dir))
    }

    /// Open a store from a shelfdb.yaml file.
    pub fn open_config_file(path: &Path) -> Result<Self> {
        Self::open(parse_config(path)?)
    }

    fn boot(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        let swept = document::sweep_orphans(&self.config.data_dir)?;
        if !swept.is_empty() {
            log::warn!("Removed {} orphaned temp files on startup", swept.len());
        }
        self.ensure_all_files()?;
        log::info!(
            "Opened store at {} ({} documents)",
            self.config.data_dir.display(),
            self.registry.len()
        );
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    /// Resolve a logical key or file name to its registry entry.
    pub fn entry(&self, doc: &str) -> Result<&DocumentEntry> {
        self.registry.resolve(doc)
    }

    /// Seed every registered document that has no file yet.
    pub fn ensure_all_files(&self) -> Result<()> {
        for entry in self.registry.entries() {
            document::ensure_exists(&entry.path, &entry.shape.default_value())?;
        }
        Ok(())
    }

    // ── Loader / saver ──────────────────────────────────────────────

    /// Load a document, degrading to `default` if it is empty or damaged
    /// beyond recovery. Only filesystem errors while seeding the file (and
    /// unknown document names) are returned as errors.
    pub fn load_json<T>(&self, doc: &str, default: &T) -> Result<T>
    where
        T: DeserializeOwned + Clone,
    {
        Ok(self.load_json_detailed(doc, default)?.into_inner())
    }

    /// Like `load_json`, but reports whether the value came from the
    /// document, its backup, or the default.
    pub fn load_json_detailed<T>(&self, doc: &str, default: &T) -> Result<Loaded<T>>
    where
        T: DeserializeOwned + Clone,
    {
        let entry = self.registry.resolve(doc)?;
        self.load_entry(entry, default, true)
    }

    /// Load a document as untyped JSON, using its shape's empty value as
    /// the default.
    pub fn load_value(&self, doc: &str) -> Result<Loaded<Value>> {
        let entry = self.registry.resolve(doc)?;
        let default = entry.shape.default_value();
        self.load_entry(entry, &default, true)
    }

    /// Validate and atomically replace a document.
    pub fn save_json<T>(&self, doc: &str, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let entry = self.registry.resolve(doc)?;
        let value = serde_json::to_value(data)?;
        let _guard = self.locks.acquire(&entry.path, self.config.lock.timeout())?;
        self.write_locked(entry, value)
    }

    /// Read-modify-write under the document's write lock.
    /// `update` receives the current value (or `default`) and returns the
    /// value to store; an error from it aborts without writing.
    pub fn update_json<T, F>(&self, doc: &str, default: &T, update: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce(T) -> Result<T>,
    {
        let entry = self.registry.resolve(doc)?;
        let _guard = self.locks.acquire(&entry.path, self.config.lock.timeout())?;

        // Always read the file here: the cache may lag a concurrent reader.
        // A stored value the caller's type cannot hold is an error, never
        // the default, or the write below would replace it.
        let current = match self.read_document(entry, false)? {
            (Some(value), _) => serde_json::from_value(value)?,
            (None, _) => default.clone(),
        };
        let updated = update(current)?;
        self.write_locked(entry, serde_json::to_value(&updated)?)?;
        Ok(updated)
    }

    /// Reset a document to `{}` or `[]`.
    pub fn clear_file(&self, doc: &str, as_array: bool) -> Result<()> {
        let empty = if as_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(serde_json::Map::new())
        };
        self.save_json(doc, &empty)
    }

    fn load_entry<T>(&self, entry: &DocumentEntry, default: &T, use_cache: bool) -> Result<Loaded<T>>
    where
        T: DeserializeOwned + Clone,
    {
        let (value, source) = self.read_document(entry, use_cache)?;
        let Some(value) = value else {
            return Ok(Loaded {
                value: default.clone(),
                source: LoadSource::Default,
            });
        };

        match serde_json::from_value(value) {
            Ok(value) => Ok(Loaded { value, source }),
            Err(e) => {
                // The file itself is fine; the caller's type disagrees with it.
                // Leave the file alone and hand back the default.
                log::warn!(
                    "{} does not match the requested type ({e}); using default",
                    entry.path.display()
                );
                Ok(Loaded {
                    value: default.clone(),
                    source: LoadSource::Default,
                })
            }
        }
    }

    /// Primary file, then `<file>.backup`, then nothing.
    fn read_document(&self, entry: &DocumentEntry, use_cache: bool) -> Result<(Option<Value>, LoadSource)> {
        let cache = self.cache.as_ref().filter(|_| use_cache);
        if let Some(value) = cache.and_then(|c| c.get(&entry.path)) {
            return Ok((Some(value), LoadSource::Primary));
        }
        let generation = cache.map(|c| c.generation(&entry.path));

        document::ensure_exists(&entry.path, &entry.shape.default_value())?;

        let failure = match document::read_json(&entry.path) {
            Ok(None) => {
                log::debug!("{} is empty; using default", entry.path.display());
                return Ok((None, LoadSource::Default));
            }
            Ok(Some(value)) => match validation::validate(entry, &value) {
                Ok(warnings) => {
                    for warning in warnings {
                        log::warn!("{}: {warning}", entry.path.display());
                    }
                    if let (Some(cache), Some(seen)) = (cache, generation) {
                        cache.fill(&entry.path, value.clone(), seen);
                    }
                    return Ok((Some(value), LoadSource::Primary));
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        log::warn!("{} is damaged ({failure}); trying backup", entry.path.display());
        if let Some(cache) = &self.cache {
            cache.invalidate(&entry.path);
        }

        match read_backup(entry) {
            Ok(value) => {
                self.restore_primary(entry, &value);
                Ok((Some(value), LoadSource::Backup))
            }
            Err(reason) => {
                log::error!(
                    "{} and its backup are unusable ({reason}); using default",
                    entry.path.display()
                );
                Ok((None, LoadSource::Default))
            }
        }
    }

    /// Put a recovered backup back in place of the damaged file. Skipped
    /// when a writer holds the lock, since that writer replaces it anyway.
    fn restore_primary(&self, entry: &DocumentEntry, value: &Value) {
        let Some(_guard) = self.locks.try_acquire(&entry.path) else {
            log::debug!("{} is being written; not restoring backup", entry.path.display());
            return;
        };
        match document::replace_atomic(entry, value) {
            Ok(()) => log::warn!("Restored {} from backup", entry.path.display()),
            Err(e) => log::warn!("Failed to restore {} from backup: {e}", entry.path.display()),
        }
    }

    /// Validate, seed and write. The caller must hold the write lock.
    fn write_locked(&self, entry: &DocumentEntry, value: Value) -> Result<()> {
        for warning in validation::validate(entry, &value)? {
            log::warn!("{}: {warning}", entry.path.display());
        }
        document::ensure_exists(&entry.path, &entry.shape.default_value())?;

        if let Err(e) = document::write_atomic(entry, &value) {
            if let Some(cache) = &self.cache {
                cache.invalidate(&entry.path);
            }
            return Err(e);
        }
        if let Some(cache) = &self.cache {
            cache.put(&entry.path, value);
        }
        log::debug!("Saved {}", entry.path.display());
        Ok(())
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    /// Parse and validate every document without repairing anything.
    pub fn verify_integrity(&self) -> IntegrityReport {
        integrity::verify_all(&self.registry)
    }

    // ── Backups ─────────────────────────────────────────────────────

    pub fn backups(&self) -> &Arc<BackupManager> {
        &self.backups
    }

    pub fn create_backup(&self) -> Result<BackupSnapshot> {
        self.backups.create_backup()
    }

    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.backups.list_backups()
    }

    pub fn cleanup_old_backups(&self) -> Result<CleanupReport> {
        self.backups.cleanup_old_backups()
    }

    pub fn backup_status(&self) -> Result<BackupStatus> {
        self.backups.status()
    }

    /// Start the periodic snapshot thread with the configured interval.
    pub fn start_backup_scheduler(&self) -> BackupScheduler {
        BackupScheduler::start(Arc::clone(&self.backups), self.config.backup.interval())
    }

    /// Restore every document found in snapshot `name`.
    /// The current state is snapshotted first. Each document goes through
    /// the normal locked, validated, atomic write; files missing from the
    /// snapshot or failing validation are skipped and reported.
    pub fn restore_backup(&self, name: &str) -> Result<RestoreReport> {
        let dir = self.backups.snapshot_dir(name)?;
        let safety = self.backups.create_backup()?;
        if !safety.failed.is_empty() {
            return Err(StoreError::Other(format!(
                "Refusing to restore {name}: safety backup {} is incomplete",
                safety.name
            )));
        }

        let mut report = RestoreReport {
            backup: name.to_string(),
            safety_backup: safety.name,
            restored: Vec::new(),
            skipped: Vec::new(),
        };

        for entry in self.registry.entries() {
            let source = dir.join(&entry.file_name);
            if !source.exists() {
                report.skipped.push(RestoreSkip {
                    document: entry.key.clone(),
                    reason: "not in backup".into(),
                });
                continue;
            }

            let value = match document::read_json(&source) {
                Ok(Some(value)) => value,
                Ok(None) => entry.shape.default_value(),
                Err(e) => {
                    report.skipped.push(RestoreSkip {
                        document: entry.key.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let _guard = self.locks.acquire(&entry.path, self.config.lock.timeout())?;
            match self.write_locked(entry, value) {
                Ok(()) => report.restored.push(entry.key.clone()),
                Err(e @ StoreError::Validation { .. }) => report.skipped.push(RestoreSkip {
                    document: entry.key.clone(),
                    reason: e.to_string(),
                }),
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Restored backup {name}: {} documents restored, {} skipped",
            report.restored.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

fn read_backup(entry: &DocumentEntry) -> std::result::Result<Value, String> {
    let path = entry.backup_path();
    if !path.exists() {
        return Err("no backup file".into());
    }
    match document::read_json(&path) {
        Ok(Some(value)) => validation::validate(entry, &value)
            .map(|_| value)
            .map_err(|e| e.to_string()),
        Ok(None) => Err("backup is empty".into()),
        Err(e) => Err(e.to_string()),
    }
}
