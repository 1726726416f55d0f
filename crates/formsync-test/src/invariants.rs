//! Engine invariants
//!
//! Checks that must hold after any sequence of operations. The property
//! tests drive random sequences through a session and assert these.

use formsync_core::{FieldErrors, FieldValues};
use formsync_state::{is_hidden, FormSchema, FormState};

/// `values` holds exactly one entry per declared field
pub fn values_complete(schema: &FormSchema, values: &FieldValues) -> bool {
    values.len() == schema.fields().len() && schema.fields().iter().all(|f| values.contains_key(&f.id))
}

/// No error is attached to a field that is currently hidden
pub fn no_errors_on_hidden(schema: &FormSchema, values: &FieldValues, errors: &FieldErrors) -> bool {
    errors.keys().all(|id| match schema.field(id.as_str()) {
        Some(field) => !is_hidden(field, values),
        None => false,
    })
}

/// Every key the template sets was overwritten; every other key is untouched
pub fn template_overlay_holds(
    schema: &FormSchema,
    template_id: &str,
    before: &FieldValues,
    after: &FieldValues,
) -> bool {
    let Some(template) = schema.template(template_id) else {
        return before == after;
    };
    before.keys().chain(after.keys()).all(|id| {
        match template.field_values.get(id) {
            Some(value) => after.get(id) == Some(value),
            None => after.get(id) == before.get(id),
        }
    })
}

/// Both invariants that hold for every observable state
pub fn state_consistent(schema: &FormSchema, state: &FormState) -> bool {
    values_complete(schema, &state.values) && no_errors_on_hidden(schema, &state.values, &state.errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::tranche_schema;
    use formsync_core::{FieldId, FieldValue};
    use formsync_state::template::apply_template;

    #[test]
    fn test_detects_error_on_hidden_field() {
        let schema = tranche_schema().unwrap();
        let mut values = FieldValues::new();
        values.insert(FieldId::new("kind"), "term".into());
        let mut errors = FieldErrors::new();
        errors.insert(FieldId::new("fee"), "Commitment Fee is required".into());

        assert!(!no_errors_on_hidden(&schema, &values, &errors));
        values.insert(FieldId::new("kind"), "rcf".into());
        assert!(no_errors_on_hidden(&schema, &values, &errors));
    }

    #[test]
    fn test_template_overlay_check() {
        let schema = tranche_schema().unwrap();
        let mut before = FieldValues::new();
        before.insert(FieldId::new("name"), "A".into());
        before.insert(FieldId::new("kind"), "term".into());

        let after = apply_template(&schema, "revolver", &before).unwrap();
        assert!(template_overlay_holds(&schema, "revolver", &before, &after));

        let mut tampered = after.clone();
        tampered.insert(FieldId::new("name"), FieldValue::from("B"));
        assert!(!template_overlay_holds(&schema, "revolver", &before, &tampered));
    }
}
