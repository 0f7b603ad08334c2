// Path registry - static mapping from logical document names to files

use crate::config::{Shape, StoreConfig};
use crate::error::{Result, StoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A registered document: its logical key, backing file and root shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub key: String,
    pub file_name: String,
    pub path: PathBuf,
    pub shape: Shape,
}

impl DocumentEntry {
    /// `<file>.tmp` sibling used by the atomic writer
    pub fn tmp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }

    /// `<file>.backup` sibling holding the previous good write
    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.path, "backup")
    }
}

/// Fixed key → file mapping rooted at the data directory.
/// Built once per Store; there is no API to change it afterwards.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    root: PathBuf,
    entries: BTreeMap<String, DocumentEntry>,
}

impl PathRegistry {
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let root = config.data_dir.clone();
        let mut entries = BTreeMap::new();
        let mut files: BTreeMap<String, String> = BTreeMap::new();

        for (key, def) in config.document_definitions() {
            check_file_name(&key, &def.file)?;
            if let Some(other) = files.insert(def.file.clone(), key.clone()) {
                return Err(StoreError::Config(format!(
                    "Documents '{other}' and '{key}' both map to '{}'",
                    def.file
                )));
            }
            entries.insert(
                key.clone(),
                DocumentEntry {
                    path: root.join(&def.file),
                    key,
                    file_name: def.file,
                    shape: def.shape,
                },
            );
        }

        Ok(PathRegistry { root, entries })
    }

    /// Look up a document by logical key (case-insensitive) or file name.
    pub fn resolve(&self, name: &str) -> Result<&DocumentEntry> {
        if let Some(entry) = self.entries.get(&name.to_ascii_uppercase()) {
            return Ok(entry);
        }
        let file_name = Path::new(name)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(name);
        self.entries
            .values()
            .find(|e| e.file_name == file_name && (e.file_name == name || e.path == Path::new(name)))
            .ok_or_else(|| StoreError::UnknownDocument(name.to_string()))
    }

    /// All entries in key order
    pub fn entries(&self) -> impl Iterator<Item = &DocumentEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The data directory every path is rooted at
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn check_file_name(key: &str, file: &str) -> Result<()> {
    let bad = file.is_empty()
        || file.contains('/')
        || file.contains('\\')
        || file == "."
        || file == ".."
        || file.ends_with(".tmp")
        || file.ends_with(".backup");
    if bad {
        return Err(StoreError::Config(format!(
            "Document '{key}' has an invalid file name '{file}'"
        )));
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config_str, DocumentDefinition};

    fn registry() -> PathRegistry {
        PathRegistry::from_config(&StoreConfig::new("/data")).unwrap()
    }

    #[test]
    fn test_resolve_by_key_and_file() {
        let reg = registry();
        let by_key = reg.resolve("TRACKERS").unwrap();
        let by_lower = reg.resolve("trackers").unwrap();
        let by_file = reg.resolve("trackers.json").unwrap();
        let by_path = reg.resolve("/data/trackers.json").unwrap();

        assert_eq!(by_key, by_lower);
        assert_eq!(by_key, by_file);
        assert_eq!(by_key, by_path);
        assert_eq!(by_key.path, PathBuf::from("/data/trackers.json"));
        assert_eq!(by_key.shape, Shape::Keyed);
    }

    #[test]
    fn test_unknown_document() {
        let reg = registry();
        assert!(matches!(
            reg.resolve("leaderboard.json"),
            Err(StoreError::UnknownDocument(_))
        ));
        // Same file name under a different directory is not the registered file
        assert!(reg.resolve("/elsewhere/trackers.json").is_err());
    }

    #[test]
    fn test_sibling_paths() {
        let reg = registry();
        let entry = reg.resolve("QUOTES").unwrap();
        assert_eq!(entry.tmp_path(), PathBuf::from("/data/quotes.json.tmp"));
        assert_eq!(entry.backup_path(), PathBuf::from("/data/quotes.json.backup"));
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let mut config = StoreConfig::new("/data");
        config.documents.insert(
            "OTHER".into(),
            DocumentDefinition {
                file: "club.json".into(),
                shape: Shape::Any,
            },
        );
        let err = PathRegistry::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("club.json"));
    }

    #[test]
    fn test_invalid_file_names_rejected() {
        for file in ["../escape.json", "nested/x.json", "x.json.tmp", "x.json.backup", ""] {
            let yaml = format!("documents:\n  bad: {{ file: '{file}' }}\n");
            let config = parse_config_str(&yaml).unwrap();
            assert!(
                matches!(PathRegistry::from_config(&config), Err(StoreError::Config(_))),
                "accepted {file:?}"
            );
        }
    }
}
