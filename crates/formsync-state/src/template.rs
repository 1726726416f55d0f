//! Template application
//!
//! A template is a named preset of values laid over the current ones. The
//! applicator only merges; recomputation, validation and the dirty flag
//! are the session's business.

use formsync_core::FieldValues;

use crate::schema::FormSchema;

/// Merge a template's values over `current`
///
/// Returns `None` when no template has that id, in which case the caller
/// keeps `current` as it is. Keys the template does not mention are left
/// untouched.
pub fn apply_template(
    schema: &FormSchema,
    template_id: &str,
    current: &FieldValues,
) -> Option<FieldValues> {
    let template = schema.template(template_id)?;
    let mut merged = current.clone();
    merged.extend(
        template
            .field_values
            .iter()
            .map(|(id, value)| (id.clone(), value.clone())),
    );
    Some(merged)
}
