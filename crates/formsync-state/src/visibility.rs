//! Visibility resolution
//!
//! A field with `dependsOn` is visible iff
//! `(values[dep.field] == dep.value) == dep.showWhen`, compared strictly.
//! Fields without a dependency are always visible. Hidden fields keep
//! their values but are never validated.

use std::collections::BTreeSet;

use formsync_core::{FieldDefinition, FieldId, FieldValues};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::FormSchema;

/// Whether `field` is hidden under `values`
///
/// A dependency on a field with no value never matches, so the field is
/// hidden exactly when it is shown on a match.
pub fn is_hidden(field: &FieldDefinition, values: &FieldValues) -> bool {
    let Some(dep) = &field.depends_on else {
        return false;
    };
    match values.get(&dep.field) {
        Some(current) => (current == &dep.value) != dep.show_when,
        None => dep.show_when,
    }
}

/// Hidden-field set for one snapshot of values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visibility {
    hidden: BTreeSet<FieldId>,
}

impl Visibility {
    /// Resolve visibility of every field in the schema
    pub fn resolve(schema: &FormSchema, values: &FieldValues, diagnostics: &Diagnostics) -> Self {
        let mut hidden = BTreeSet::new();
        for field in schema.fields() {
            if let Some(dep) = &field.depends_on {
                if !values.contains_key(&dep.field) {
                    diagnostics.report(Diagnostic::DanglingDependency {
                        form_id: schema.form_id().clone(),
                        field_id: field.id.clone(),
                        depends_on: dep.field.clone(),
                    });
                }
            }
            if is_hidden(field, values) {
                hidden.insert(field.id.clone());
            }
        }
        Visibility { hidden }
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.hidden.contains(id)
    }

    pub fn is_visible(&self, id: &str) -> bool {
        !self.is_hidden(id)
    }

    pub fn hidden(&self) -> &BTreeSet<FieldId> {
        &self.hidden
    }
}
