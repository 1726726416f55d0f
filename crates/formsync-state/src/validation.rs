//! Field validation
//!
//! Only visible fields are checked. An empty required field fails with
//! "<label> is required"; a non-empty value is then checked against its
//! rules in the order pattern, min, max, and the last failing rule wins.

use serde::Serialize;

use formsync_core::{FieldDefinition, FieldErrors, FieldValue, FieldValues};

use crate::schema::FormSchema;
use crate::visibility::Visibility;

/// Outcome of validating a full set of values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: FieldErrors,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate every visible field
pub fn validate(
    schema: &FormSchema,
    values: &FieldValues,
    visibility: &Visibility,
) -> ValidationReport {
    let mut errors = FieldErrors::new();
    for field in schema.fields() {
        if visibility.is_hidden(field.id.as_str()) {
            continue;
        }
        let value = values.get(&field.id).cloned().unwrap_or_default();
        if let Some(message) = check_field(schema, field, &value) {
            errors.insert(field.id.clone(), message);
        }
    }
    ValidationReport { errors }
}

/// Error message for one field, if it fails
pub fn check_field(schema: &FormSchema, field: &FieldDefinition, value: &FieldValue) -> Option<String> {
    if value.is_empty() {
        return field
            .required
            .then(|| format!("{} is required", field.label));
    }

    let rule = field.validation.as_ref()?;
    let custom = rule.message.as_deref();
    let mut error = None;

    if let Some(pattern) = schema.pattern(field.id.as_str()) {
        if !pattern.is_match(&value.to_text()) {
            error = Some(
                custom
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Invalid format for {}", field.label)),
            );
        }
    }

    // Values that do not read as numbers are not range-checked
    let number = value.as_number();
    if let (Some(min), Some(n)) = (rule.min, number) {
        if n < min {
            error = Some(
                custom
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} must be at least {}", field.label, min)),
            );
        }
    }
    if let (Some(max), Some(n)) = (rule.max, number) {
        if n > max {
            error = Some(
                custom
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{} must not exceed {}", field.label, max)),
            );
        }
    }

    error
}
