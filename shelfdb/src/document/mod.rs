// Document I/O - guard, raw reads and the temp-file-then-rename writer

use crate::error::Result;
use crate::registry::DocumentEntry;
use crate::validation;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Make sure `path` and its parent directories exist, seeding a missing
/// file with `default` as pretty JSON. Existing files are left alone.
pub fn ensure_exists(path: &Path, default: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if !path.exists() {
        let content = serde_json::to_string_pretty(default)?;
        write_replace(path, content.as_bytes())?;
        log::debug!("Seeded {} with default value", path.display());
    }
    Ok(())
}

/// Read and parse a JSON file. Returns `None` for an empty (or
/// whitespace-only) file.
pub fn read_json(path: &Path) -> Result<Option<Value>> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write a document so that readers only ever see the old or the new
/// content. The caller is expected to have validated `data` already.
///
/// Before replacing the file, the current content is copied to
/// `<file>.backup` if it is itself a valid document. A corrupt primary
/// never overwrites a good backup. Backup failures are logged only.
pub fn write_atomic(entry: &DocumentEntry, data: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(data)?;
    backup_current(entry);
    write_replace(&entry.path, content.as_bytes())
}

/// Replace the document without touching `<file>.backup`. Used when the
/// backup itself is the source being restored.
pub fn replace_atomic(entry: &DocumentEntry, data: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(data)?;
    write_replace(&entry.path, content.as_bytes())
}

/// Remove `*.tmp` leftovers from interrupted writes in `dir`.
/// Returns the paths that were removed.
pub fn sweep_orphans(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = format!("{}/*.tmp", glob::Pattern::escape(&dir.to_string_lossy()));
    let orphans: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| crate::error::StoreError::Other(format!("Glob error: {e}")))?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();

    let mut removed = Vec::new();
    for path in orphans {
        match fs::remove_file(&path) {
            Ok(()) => {
                log::warn!("Removed orphaned temp file {}", path.display());
                removed.push(path);
            }
            Err(e) => log::warn!("Failed to remove orphaned temp file {}: {e}", path.display()),
        }
    }
    Ok(removed)
}

fn backup_current(entry: &DocumentEntry) {
    if !entry.path.exists() {
        return;
    }
    match read_json(&entry.path) {
        Ok(Some(current)) if validation::validate_document(entry.shape, &current).is_ok() => {
            if let Err(e) = fs::copy(&entry.path, entry.backup_path()) {
                log::warn!("Failed to back up {}: {e}", entry.path.display());
            }
        }
        Ok(Some(_)) => log::warn!(
            "Not backing up {}: current content fails validation",
            entry.path.display()
        ),
        Ok(None) => {}
        Err(e) => log::warn!(
            "Not backing up {}: current content unreadable: {e}",
            entry.path.display()
        ),
    }
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    if let Err(e) = write_synced(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Shape;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(dir: &Path) -> DocumentEntry {
        DocumentEntry {
            key: "TRACKERS".into(),
            file_name: "trackers.json".into(),
            path: dir.join("trackers.json"),
            shape: Shape::Keyed,
        }
    }

    #[test]
    fn test_ensure_exists_creates_dirs_and_seeds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/deeper/club.json");

        ensure_exists(&path, &json!({ "books": [] })).unwrap();
        assert_eq!(read_json(&path).unwrap(), Some(json!({ "books": [] })));
    }

    #[test]
    fn test_ensure_exists_keeps_existing_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("club.json");
        fs::write(&path, r#"{"clubCurrent":"Dune"}"#).unwrap();

        ensure_exists(&path, &json!({})).unwrap();
        assert_eq!(read_json(&path).unwrap(), Some(json!({ "clubCurrent": "Dune" })));
    }

    #[test]
    fn test_read_empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs.json");
        fs::write(&path, "  \n").unwrap();
        assert_eq!(read_json(&path).unwrap(), None);
    }

    #[test]
    fn test_read_invalid_json_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs.json");
        fs::write(&path, "{not json").unwrap();
        assert!(read_json(&path).is_err());
    }

    #[test]
    fn test_write_atomic_backs_up_previous() {
        let tmp = TempDir::new().unwrap();
        let entry = entry(tmp.path());

        write_atomic(&entry, &json!({ "u1": { "tracked": [] } })).unwrap();
        assert!(!entry.backup_path().exists());

        write_atomic(&entry, &json!({ "u2": { "tracked": [] } })).unwrap();
        assert_eq!(read_json(&entry.path).unwrap(), Some(json!({ "u2": { "tracked": [] } })));
        assert_eq!(
            read_json(&entry.backup_path()).unwrap(),
            Some(json!({ "u1": { "tracked": [] } }))
        );
        assert!(!entry.tmp_path().exists());
    }

    #[test]
    fn test_corrupt_primary_does_not_clobber_backup() {
        let tmp = TempDir::new().unwrap();
        let entry = entry(tmp.path());
        fs::write(entry.backup_path(), r#"{"u1":{"tracked":[]}}"#).unwrap();
        fs::write(&entry.path, "{not json").unwrap();

        write_atomic(&entry, &json!({ "u9": {} })).unwrap();
        assert_eq!(
            read_json(&entry.backup_path()).unwrap(),
            Some(json!({ "u1": { "tracked": [] } }))
        );
    }

    #[test]
    fn test_replace_atomic_skips_backup() {
        let tmp = TempDir::new().unwrap();
        let entry = entry(tmp.path());
        write_atomic(&entry, &json!({ "a": {} })).unwrap();

        replace_atomic(&entry, &json!({ "b": {} })).unwrap();
        assert!(!entry.backup_path().exists());
        assert_eq!(read_json(&entry.path).unwrap(), Some(json!({ "b": {} })));
    }

    #[test]
    fn test_sweep_orphans() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("trackers.json.tmp"), "{").unwrap();
        fs::write(tmp.path().join("quotes.json.tmp"), "").unwrap();
        fs::write(tmp.path().join("trackers.json"), "{}").unwrap();

        let mut removed = sweep_orphans(tmp.path()).unwrap();
        removed.sort();
        assert_eq!(removed.len(), 2);
        assert!(!tmp.path().join("trackers.json.tmp").exists());
        assert!(tmp.path().join("trackers.json").exists());
    }

    #[test]
    fn test_sweep_missing_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        let removed = sweep_orphans(&tmp.path().join("absent")).unwrap();
        assert!(removed.is_empty());
    }
}
