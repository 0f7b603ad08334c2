use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level store configuration, usually parsed from shelfdb.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    /// Extra or overriding document registrations, keyed by logical name
    #[serde(default)]
    pub documents: BTreeMap<String, DocumentDefinition>,
    /// Merge the built-in book-club documents into `documents`
    #[serde(default = "default_true")]
    pub include_defaults: bool,
}

/// Write lock tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Read cache settings. A TTL of zero disables the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub ttl_ms: u64,
}

/// Snapshot location, cadence and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

/// Definition of a single registered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDefinition {
    pub file: String,
    #[serde(default)]
    pub shape: Shape,
}

/// Root shape a document must keep for its whole life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Object keyed by user or entity ID; never an array
    Keyed,
    /// Arbitrary object
    Object,
    /// Top-level array
    List,
    /// Object or array
    #[default]
    Any,
}

impl Shape {
    /// Value a fresh document is seeded with.
    pub fn default_value(&self) -> serde_json::Value {
        match self {
            Shape::List => serde_json::Value::Array(Vec::new()),
            Shape::Keyed | Shape::Object | Shape::Any => {
                serde_json::Value::Object(serde_json::Map::new())
            }
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StoreConfig {
            data_dir: data_dir.into(),
            lock: LockConfig::default(),
            cache: CacheConfig::default(),
            backup: BackupConfig::default(),
            documents: BTreeMap::new(),
            include_defaults: true,
        }
    }

    /// Absolute (or data-dir relative) location of the snapshot root.
    pub fn backup_dir(&self) -> PathBuf {
        resolve_under(&self.data_dir, &self.backup.dir)
    }

    /// All document registrations: built-ins (if enabled) overlaid with
    /// the configured ones. Keys are upper-cased.
    pub fn document_definitions(&self) -> BTreeMap<String, DocumentDefinition> {
        let mut defs = if self.include_defaults {
            default_documents()
        } else {
            BTreeMap::new()
        };
        for (key, def) in &self.documents {
            defs.insert(key.to_ascii_uppercase(), def.clone());
        }
        defs
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            timeout_ms: default_lock_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CacheConfig {
    /// `None` when caching is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.max(1).saturating_mul(60 * 60))
    }

    /// How long snapshots are kept. `None` when the window is too large to
    /// represent, which keeps every snapshot.
    pub fn retention(&self) -> Option<chrono::Duration> {
        i64::try_from(self.retention_days)
            .ok()
            .and_then(chrono::Duration::try_days)
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            dir: default_backup_dir(),
            interval_hours: default_interval_hours(),
            retention_days: default_retention_days(),
        }
    }
}

/// The documents the book-club bot keeps on disk.
pub fn default_documents() -> BTreeMap<String, DocumentDefinition> {
    [
        ("TRACKERS", "trackers.json", Shape::Keyed),
        ("LOGS", "logs.json", Shape::Keyed),
        ("QUOTES", "quotes.json", Shape::Keyed),
        ("GOODREADS_LINKS", "goodreads_links.json", Shape::Keyed),
        ("CLUB", "club.json", Shape::Object),
    ]
    .into_iter()
    .map(|(key, file, shape)| {
        (
            key.to_string(),
            DocumentDefinition {
                file: file.to_string(),
                shape,
            },
        )
    })
    .collect()
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_interval_hours() -> u64 {
    24
}

fn default_retention_days() -> u64 {
    7
}
