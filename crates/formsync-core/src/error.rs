//! Error types for formsync

use thiserror::Error;

use crate::{FieldErrors, FieldId, FormId, TabId};

/// Schema errors - fatal, raised before any session exists
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Malformed schema document: {0}")]
    Malformed(String),

    #[error("Duplicate field id: {0}")]
    DuplicateField(FieldId),

    #[error("{location} references undeclared field {field}")]
    UnknownFieldReference { location: String, field: FieldId },

    #[error("Computed field {0} has no formula")]
    MissingFormula(FieldId),

    #[error("Field {field} references unknown formula {formula}")]
    UnknownFormula { field: FieldId, formula: String },

    #[error("Formula {formula} does not parse: {message}")]
    FormulaSyntax { formula: String, message: String },

    #[error("Invalid pattern on field {field}: {message}")]
    InvalidPattern { field: FieldId, message: String },
}

/// Core formsync errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    // Validation
    #[error("Form is invalid: {} field(s) failed validation", .0.len())]
    ValidationFailed(FieldErrors),

    // Lifecycle
    #[error("Session for form {form_id} has been destroyed")]
    Destroyed { form_id: FormId },

    // Caller errors
    #[error("Unknown form: {0}")]
    UnknownForm(FormId),

    #[error("Unknown field: {0}")]
    UnknownField(FieldId),

    #[error("Unknown tab: {0}")]
    UnknownTab(TabId),

    #[error("Session for form {0} is read-only")]
    ReadOnly(FormId),

    // Collaboration
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Malformed collaboration message: {0}")]
    MalformedMessage(String),

    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FormError {
    /// Programming-error conditions, as opposed to user-facing validation
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, FormError::Destroyed { .. })
    }
}

/// Result type for formsync operations
pub type FormResult<T> = Result<T, FormError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = FormError::from(SchemaError::UnknownFieldReference {
            location: "layout section s1".into(),
            field: FieldId::new("ghost"),
        });
        assert_eq!(
            err.to_string(),
            "Schema error: layout section s1 references undeclared field ghost"
        );

        let mut errors = FieldErrors::new();
        errors.insert(FieldId::new("a"), "A is required".into());
        assert_eq!(
            FormError::ValidationFailed(errors).to_string(),
            "Form is invalid: 1 field(s) failed validation"
        );
    }

    #[test]
    fn test_lifecycle_classification() {
        assert!(FormError::Destroyed {
            form_id: FormId::new("f")
        }
        .is_lifecycle());
        assert!(!FormError::UnknownField(FieldId::new("x")).is_lifecycle());
    }
}
