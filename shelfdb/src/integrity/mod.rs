// Integrity checker - side-effect-free parse/validate pass over every document

use crate::document;
use crate::registry::{DocumentEntry, PathRegistry};
use crate::validation;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub results: Vec<DocumentCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentCheck {
    pub document: String,
    pub file: PathBuf,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Check every registered document. Nothing is seeded, restored or
/// rewritten; a damaged document is reported, not repaired.
pub fn verify_all(registry: &PathRegistry) -> IntegrityReport {
    let results: Vec<DocumentCheck> = registry.entries().map(check_document).collect();
    let valid = results.iter().all(|r| r.valid);
    if !valid {
        let bad: Vec<&str> = results
            .iter()
            .filter(|r| !r.valid)
            .map(|r| r.document.as_str())
            .collect();
        log::warn!("Integrity check failed for: {}", bad.join(", "));
    }
    IntegrityReport { valid, results }
}

fn check_document(entry: &DocumentEntry) -> DocumentCheck {
    let mut check = DocumentCheck {
        document: entry.key.clone(),
        file: entry.path.clone(),
        valid: false,
        size_bytes: None,
        error: None,
        warnings: Vec::new(),
    };

    let size = match std::fs::metadata(&entry.path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            check.error = Some("missing".into());
            return check;
        }
        Err(e) => {
            check.error = Some(e.to_string());
            return check;
        }
    };
    check.size_bytes = Some(size);

    let data = match document::read_json(&entry.path) {
        Ok(Some(data)) => data,
        Ok(None) => {
            check.error = Some("empty".into());
            return check;
        }
        Err(e) => {
            check.error = Some(e.to_string());
            return check;
        }
    };

    match validation::validate(entry, &data) {
        Ok(warnings) => {
            check.valid = true;
            check.warnings = warnings;
        }
        Err(e) => check.error = Some(e.to_string()),
    }
    check
}
