use crate::config::Shape;
use crate::error::{Result, StoreError};
use crate::registry::DocumentEntry;
use serde_json::Value;

/// Result of validating a document
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Check a document's root against the shape registered for it.
/// Root shape problems are errors; suspicious entries inside a keyed
/// document are warnings only.
pub fn validate_document(shape: Shape, data: &Value) -> ValidationResult {
    let mut result = ValidationResult {
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    match shape {
        Shape::Keyed => match data {
            Value::Object(map) => {
                for (id, entry) in map {
                    if !entry.is_object() && !entry.is_array() {
                        result.warnings.push(format!(
                            "Entry '{id}' expected object or list, got {}",
                            type_name(entry)
                        ));
                    }
                }
            }
            Value::Array(_) => result
                .errors
                .push("Keyed document must be an object, not an array".into()),
            other => result.errors.push(format!(
                "Keyed document must be an object, got {}",
                type_name(other)
            )),
        },
        Shape::Object => {
            if !data.is_object() {
                result.errors.push(format!(
                    "Document must be an object, got {}",
                    type_name(data)
                ));
            }
        }
        Shape::List => {
            if !data.is_array() {
                result.errors.push(format!(
                    "Document must be a list, got {}",
                    type_name(data)
                ));
            }
        }
        Shape::Any => {
            if !data.is_object() && !data.is_array() {
                result.errors.push(format!(
                    "Document must be an object or list, got {}",
                    type_name(data)
                ));
            }
        }
    }

    result
}

/// Validate data bound for (or read from) a registered document.
/// Returns the warnings on success, or an error naming the file.
pub fn validate(entry: &DocumentEntry, data: &Value) -> Result<Vec<String>> {
    let result = validate_document(entry.shape, data);

    if !result.is_ok() {
        return Err(StoreError::Validation {
            path: entry.path.clone(),
            message: result.errors.join("; "),
        });
    }

    Ok(result.warnings)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
