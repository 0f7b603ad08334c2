//! Timestamped snapshots of every registered document.
//!
//! A snapshot is a directory under the backup root named after the UTC
//! time it was taken (`2026-10-16T09-30-00-123Z`). Snapshots are written
//! once and only ever removed by retention cleanup.

pub mod scheduler;

use crate::config::BackupConfig;
use crate::error::{Result, StoreError};
use crate::registry::PathRegistry;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub use scheduler::{BackupScheduler, PassReport, SchedulerState};

const NAME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Outcome of one snapshot pass
#[derive(Debug, Clone, Serialize)]
pub struct BackupSnapshot {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Documents copied into the snapshot
    pub copied: Vec<String>,
    /// Documents with no file on disk yet
    pub skipped: Vec<String>,
    pub failed: Vec<BackupFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupFailure {
    pub document: String,
    pub error: String,
}

/// A snapshot found on disk
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub files: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupStatus {
    pub backup_dir: PathBuf,
    pub count: usize,
    pub newest: Option<String>,
    pub oldest: Option<String>,
    pub total_size_bytes: u64,
    pub retention_days: u64,
    pub interval_hours: u64,
}

/// Creates, lists and prunes snapshots. Does not take write locks: it
/// copies whatever complete file currently sits at each document path.
pub struct BackupManager {
    root: PathBuf,
    registry: PathRegistry,
    settings: BackupConfig,
}

impl BackupManager {
    pub fn new(root: PathBuf, registry: PathRegistry, settings: BackupConfig) -> Self {
        BackupManager {
            root,
            registry,
            settings,
        }
    }

    /// Snapshot root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &BackupConfig {
        &self.settings
    }

    /// Copy every registered document into a new snapshot directory.
    /// Per-document failures are recorded, never fatal; only failing to
    /// create the snapshot directory itself is an error.
    pub fn create_backup(&self) -> Result<BackupSnapshot> {
        fs::create_dir_all(&self.root)?;
        let created_at = Utc::now();
        let (name, path) = self.reserve_dir(&created_at)?;

        let mut snapshot = BackupSnapshot {
            name,
            path,
            created_at,
            copied: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };

        for entry in self.registry.entries() {
            if !entry.path.exists() {
                snapshot.skipped.push(entry.key.clone());
                continue;
            }
            match fs::copy(&entry.path, snapshot.path.join(&entry.file_name)) {
                Ok(_) => snapshot.copied.push(entry.key.clone()),
                Err(e) => {
                    log::warn!("Backup of {} failed: {e}", entry.key);
                    snapshot.failed.push(BackupFailure {
                        document: entry.key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Created backup {} ({} copied, {} skipped, {} failed)",
            snapshot.name,
            snapshot.copied.len(),
            snapshot.skipped.len(),
            snapshot.failed.len()
        );
        Ok(snapshot)
    }

    /// All snapshots, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            let path = dir_entry.path();
            match scan_snapshot(&name, &path) {
                Ok((created_at, files, size_bytes)) => backups.push(BackupInfo {
                    name,
                    path,
                    created_at,
                    files,
                    size_bytes,
                }),
                Err(e) => log::warn!("Skipping unreadable backup {name}: {e}"),
            }
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.name.cmp(&a.name)));
        Ok(backups)
    }

    /// Delete snapshots older than the retention window.
    pub fn cleanup_old_backups(&self) -> Result<CleanupReport> {
        let backups = self.list_backups()?;
        let Some(cutoff) = self
            .settings
            .retention()
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            log::warn!(
                "Retention of {} days reaches past the earliest date; keeping all backups",
                self.settings.retention_days
            );
            return Ok(CleanupReport {
                deleted: 0,
                remaining: backups.len(),
            });
        };
        let mut report = CleanupReport {
            deleted: 0,
            remaining: 0,
        };

        for backup in backups {
            if backup.created_at >= cutoff {
                report.remaining += 1;
                continue;
            }
            match fs::remove_dir_all(&backup.path) {
                Ok(()) => {
                    log::info!("Deleted expired backup {}", backup.name);
                    report.deleted += 1;
                }
                Err(e) => {
                    log::warn!("Failed to delete expired backup {}: {e}", backup.name);
                    report.remaining += 1;
                }
            }
        }

        Ok(report)
    }

    pub fn status(&self) -> Result<BackupStatus> {
        let backups = self.list_backups()?;
        Ok(BackupStatus {
            backup_dir: self.root.clone(),
            count: backups.len(),
            newest: backups.first().map(|b| b.name.clone()),
            oldest: backups.last().map(|b| b.name.clone()),
            total_size_bytes: backups.iter().map(|b| b.size_bytes).sum(),
            retention_days: self.settings.retention_days,
            interval_hours: self.settings.interval_hours,
        })
    }

    /// Directory of an existing snapshot.
    pub fn snapshot_dir(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\\');
        let path = self.root.join(name);
        if !plain || !path.is_dir() {
            return Err(StoreError::BackupNotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Create a fresh directory for a snapshot taken at `at`, adding a
    /// numeric suffix if another snapshot already claimed the name.
    fn reserve_dir(&self, at: &DateTime<Utc>) -> Result<(String, PathBuf)> {
        let base = snapshot_name(at);
        let mut attempt = 0;
        loop {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = self.root.join(&name);
            match fs::create_dir(&path) {
                Ok(()) => return Ok((name, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Name a snapshot directory for the given instant.
fn snapshot_name(at: &DateTime<Utc>) -> String {
    at.format(NAME_FORMAT).to_string()
}

/// Timestamp, file count and total size of a snapshot directory.
fn scan_snapshot(name: &str, path: &Path) -> Result<(DateTime<Utc>, usize, u64)> {
    let created_at = snapshot_time(name, path)?;
    let mut files = 0;
    let mut size_bytes = 0;
    for file in fs::read_dir(path)? {
        let meta = file?.metadata()?;
        if meta.is_file() {
            files += 1;
            size_bytes += meta.len();
        }
    }
    Ok((created_at, files, size_bytes))
}

/// When a snapshot was taken: parsed from its name, falling back to the
/// directory's filesystem timestamps for foreign names.
fn snapshot_time(name: &str, path: &Path) -> Result<DateTime<Utc>> {
    if let Some((stamp, _suffix)) = name.split_once('Z') {
        let stamp = format!("{stamp}Z");
        if let Ok(naive) = NaiveDateTime::parse_from_str(&stamp, NAME_FORMAT) {
            return Ok(naive.and_utc());
        }
    }
    let meta = fs::metadata(path)?;
    let time = meta.created().or_else(|_| meta.modified())?;
    Ok(DateTime::<Utc>::from(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup(retention_days: u64) -> (TempDir, BackupManager) {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::new(tmp.path());
        let registry = PathRegistry::from_config(&config).unwrap();
        let settings = BackupConfig {
            retention_days,
            ..BackupConfig::default()
        };
        let manager = BackupManager::new(config.backup_dir(), registry, settings);
        (tmp, manager)
    }

    fn fake_snapshot(manager: &BackupManager, age_days: i64) -> String {
        let at = Utc::now() - chrono::Duration::days(age_days);
        let name = snapshot_name(&at);
        let dir = manager.root().join(&name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("trackers.json"), "{}").unwrap();
        name
    }

    #[test]
    fn test_create_backup_copies_existing_documents() {
        let (tmp, manager) = setup(7);
        fs::write(tmp.path().join("trackers.json"), r#"{"u1":{"tracked":[]}}"#).unwrap();
        fs::write(tmp.path().join("club.json"), "{}").unwrap();

        let snapshot = manager.create_backup().unwrap();
        assert_eq!(snapshot.copied, vec!["CLUB".to_string(), "TRACKERS".to_string()]);
        assert_eq!(snapshot.skipped.len(), 3);
        assert!(snapshot.failed.is_empty());
        assert_eq!(
            fs::read_to_string(snapshot.path.join("trackers.json")).unwrap(),
            r#"{"u1":{"tracked":[]}}"#
        );
        assert!(!snapshot.name.contains(':'));
    }

    #[test]
    fn test_same_instant_gets_suffix() {
        let (_tmp, manager) = setup(7);
        fs::create_dir_all(manager.root()).unwrap();
        let at = Utc::now();
        let (first, _) = manager.reserve_dir(&at).unwrap();
        let (second, _) = manager.reserve_dir(&at).unwrap();
        assert_eq!(first, snapshot_name(&at));
        assert_eq!(second, format!("{first}-1"));
    }

    #[test]
    fn test_list_newest_first() {
        let (_tmp, manager) = setup(7);
        let old = fake_snapshot(&manager, 3);
        let new = fake_snapshot(&manager, 1);

        let backups = manager.list_backups().unwrap();
        let names: Vec<_> = backups.iter().map(|b| b.name.clone()).collect();
        assert_eq!(names, vec![new, old]);
        assert_eq!(backups[0].files, 1);
        assert_eq!(backups[0].size_bytes, 2);
    }

    #[test]
    fn test_list_without_root() {
        let (_tmp, manager) = setup(7);
        assert!(manager.list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_retention_pruning() {
        let (_tmp, manager) = setup(7);
        let today = fake_snapshot(&manager, 0);
        let five = fake_snapshot(&manager, 5);
        let ten = fake_snapshot(&manager, 10);

        let report = manager.cleanup_old_backups().unwrap();
        assert_eq!(report, CleanupReport { deleted: 1, remaining: 2 });
        assert!(manager.root().join(&today).exists());
        assert!(manager.root().join(&five).exists());
        assert!(!manager.root().join(&ten).exists());
    }

    #[test]
    fn test_unbounded_retention_keeps_everything() {
        let (_tmp, manager) = setup(u64::MAX / 2);
        let old = fake_snapshot(&manager, 400);
        fake_snapshot(&manager, 0);

        let report = manager.cleanup_old_backups().unwrap();
        assert_eq!(report, CleanupReport { deleted: 0, remaining: 2 });
        assert!(manager.root().join(&old).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_snapshot_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, manager) = setup(7);
        let good = fake_snapshot(&manager, 0);
        let locked = manager.root().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let readable = fs::read_dir(&locked).is_ok();
        let listed = manager.list_backups();
        let cleaned = manager.cleanup_old_backups();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let names: Vec<_> = listed.unwrap().into_iter().map(|b| b.name).collect();
        if readable {
            // Permissions are not enforced for this user (e.g. root)
            assert_eq!(names.len(), 2);
        } else {
            assert_eq!(names, vec![good]);
        }
        assert_eq!(cleaned.unwrap().deleted, 0);
    }

    #[test]
    fn test_suffixed_name_parses() {
        let at = Utc::now() - chrono::Duration::days(2);
        let name = format!("{}-3", snapshot_name(&at));
        let parsed = snapshot_time(&name, Path::new("/nonexistent")).unwrap();
        assert_eq!(parsed.timestamp_millis(), at.timestamp_millis());
    }

    #[test]
    fn test_status() {
        let (_tmp, manager) = setup(7);
        let old = fake_snapshot(&manager, 2);
        let new = fake_snapshot(&manager, 0);

        let status = manager.status().unwrap();
        assert_eq!(status.count, 2);
        assert_eq!(status.newest, Some(new));
        assert_eq!(status.oldest, Some(old));
        assert_eq!(status.total_size_bytes, 4);
        assert_eq!(status.retention_days, 7);
    }

    #[test]
    fn test_snapshot_dir_rejects_unknown_and_traversal() {
        let (_tmp, manager) = setup(7);
        let name = fake_snapshot(&manager, 0);
        assert!(manager.snapshot_dir(&name).is_ok());
        assert!(matches!(
            manager.snapshot_dir("2001-01-01T00-00-00-000Z"),
            Err(StoreError::BackupNotFound(_))
        ));
        assert!(matches!(
            manager.snapshot_dir(".."),
            Err(StoreError::BackupNotFound(_))
        ));
    }
}
