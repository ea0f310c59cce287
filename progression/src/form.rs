//! Form validation against a Node's [`FormSchema`]
//!
//! Errors carry an indexed path (`observations[1].scene`) so a caller can
//! point at the exact field. Validation collects every error rather than
//! stopping at the first.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{FieldKind, FormField, FormSchema};

/// One failed field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Indexed field path, e.g. `observations[1].scene`
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate `data` against `schema`.
pub fn validate(schema: &FormSchema, data: &Value) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    match data.as_object() {
        Some(object) => validate_fields(&schema.fields, object, "", &mut errors),
        None => errors.push(FieldError::new("", "submission must be an object")),
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn validate_fields(
    fields: &[FormField],
    object: &serde_json::Map<String, Value>,
    prefix: &str,
    errors: &mut Vec<FieldError>,
) {
    for field in fields {
        let path = join(prefix, &field.name);
        match object.get(&field.name) {
            None => {
                if field.required {
                    errors.push(FieldError::new(&path, "is required"));
                }
            }
            Some(value) if is_blank(value) => {
                if field.required {
                    errors.push(FieldError::new(&path, "must not be empty"));
                }
            }
            Some(value) => validate_value(field, value, &path, errors),
        }
    }
}

fn validate_value(field: &FormField, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    match field.kind {
        FieldKind::Text | FieldKind::Textarea => {
            if !value.is_string() {
                errors.push(FieldError::new(path, "must be text"));
            }
        }
        FieldKind::Select => match value.as_str() {
            Some(choice) if field.options.iter().any(|o| o == choice) => {}
            Some(choice) => errors.push(FieldError::new(
                path,
                format!("'{}' is not one of: {}", choice, field.options.join(", ")),
            )),
            None => errors.push(FieldError::new(path, "must be one of the listed options")),
        },
        FieldKind::Number => {
            let numeric = value.is_number()
                || value
                    .as_str()
                    .is_some_and(|s| s.trim().parse::<f64>().is_ok());
            if !numeric {
                errors.push(FieldError::new(path, "must be a number"));
            }
        }
        FieldKind::Array => validate_array(field, value, path, errors),
    }
}

fn validate_array(field: &FormField, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(items) = value.as_array() else {
        errors.push(FieldError::new(path, "must be a list"));
        return;
    };

    if let Some(min) = field.min_items {
        if items.len() < min {
            errors.push(FieldError::new(
                path,
                format!("needs at least {} items (got {})", min, items.len()),
            ));
        }
    }
    if let Some(max) = field.max_items {
        if items.len() > max {
            errors.push(FieldError::new(
                path,
                format!("allows at most {} items (got {})", max, items.len()),
            ));
        }
    }

    if field.item_fields.is_empty() {
        return;
    }
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, index);
        match item.as_object() {
            Some(object) => validate_fields(&field.item_fields, object, &item_path, errors),
            None => errors.push(FieldError::new(&item_path, "must be an object")),
        }
    }
}
