//! Computed field evaluation
//!
//! Every computed field is re-derived after every accepted edit, whichever
//! field changed. All formulas read the same snapshot of values and each
//! one is evaluated exactly once per trigger: a cycle between formulas
//! lags by one edit instead of being iterated to a fixed point.

use formsync_core::{FieldId, FieldValues};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::FormSchema;

/// Re-derive computed fields, returning only the values that changed
///
/// `changed` names the edited field, or `None` after a bulk overlay such
/// as a template. A formula that fails leaves its field untouched; the
/// failure goes to `diagnostics`.
pub fn recompute(
    schema: &FormSchema,
    values: &FieldValues,
    changed: Option<&FieldId>,
    diagnostics: &Diagnostics,
) -> FieldValues {
    let mut updates = FieldValues::new();

    for field in schema.computed_fields() {
        let Some(formula) = schema.formula(field.id.as_str()) else {
            continue;
        };
        match formula.evaluate(values) {
            Ok(value) => {
                if values.get(&field.id) != Some(&value) {
                    updates.insert(field.id.clone(), value);
                }
            }
            Err(error) => diagnostics.report(Diagnostic::FormulaFailed {
                form_id: schema.form_id().clone(),
                field_id: field.id.clone(),
                formula: formula.name.clone(),
                error,
            }),
        }
    }

    tracing::debug!(
        form = %schema.form_id(),
        trigger = ?changed,
        updated = updates.len(),
        "recomputed"
    );
    updates
}
