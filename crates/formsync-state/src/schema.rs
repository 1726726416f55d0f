//! Compiled form schema
//!
//! A `FormSchema` is a `FormConfiguration` whose references have all been
//! resolved: every id named by the layout, by a dependency, by a template
//! or by a formula is a declared field, every computed field has a formula
//! that parses, and every pattern compiles. Sessions only ever see a
//! compiled schema, so none of these checks repeat at edit time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;

use formsync_core::{
    FieldDefinition, FieldId, FormConfiguration, FormId, FormResult, SchemaError, Template,
};
use formsync_formula::Formula;

/// Validated, immutable form schema
#[derive(Debug)]
pub struct FormSchema {
    config: FormConfiguration,
    /// Field id -> position in `config.fields`
    index: HashMap<FieldId, usize>,
    /// Compiled `validation.pattern` per field
    patterns: HashMap<FieldId, Regex>,
    /// Computed field -> parsed formula
    formulas: HashMap<FieldId, Formula>,
}

impl FormSchema {
    /// Compile a schema document, rejecting any dangling reference
    pub fn load(config: FormConfiguration) -> FormResult<Arc<FormSchema>> {
        let index = index_fields(&config)?;
        check_layout(&config, &index)?;
        check_dependencies(&config, &index)?;
        check_templates(&config, &index)?;

        // Every named calculation must parse and read only declared fields,
        // whether or not a field currently uses it.
        let mut parsed: HashMap<String, Formula> = HashMap::new();
        for (name, source) in &config.calculations {
            let formula =
                Formula::parse(name.clone(), source).map_err(|e| SchemaError::FormulaSyntax {
                    formula: name.clone(),
                    message: e.to_string(),
                })?;
            for field in formula.field_refs() {
                if !index.contains_key(field.as_str()) {
                    return Err(SchemaError::UnknownFieldReference {
                        location: format!("formula {}", name),
                        field: FieldId::new(field),
                    }
                    .into());
                }
            }
            parsed.insert(name.clone(), formula);
        }

        let mut formulas = HashMap::new();
        for field in config.computed_fields() {
            let name = field
                .formula
                .as_ref()
                .ok_or_else(|| SchemaError::MissingFormula(field.id.clone()))?;
            let formula = parsed
                .get(name)
                .ok_or_else(|| SchemaError::UnknownFormula {
                    field: field.id.clone(),
                    formula: name.clone(),
                })?;
            formulas.insert(field.id.clone(), formula.clone());
        }

        let mut patterns = HashMap::new();
        for field in &config.fields {
            let Some(pattern) = field.validation.as_ref().and_then(|v| v.pattern.as_ref()) else {
                continue;
            };
            let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                field: field.id.clone(),
                message: e.to_string(),
            })?;
            patterns.insert(field.id.clone(), regex);
        }

        tracing::debug!(
            form = %config.form_id,
            fields = config.fields.len(),
            computed = formulas.len(),
            "schema loaded"
        );

        Ok(Arc::new(FormSchema {
            config,
            index,
            patterns,
            formulas,
        }))
    }

    /// Parse and compile a JSON schema document
    pub fn from_json(json: &str) -> FormResult<Arc<FormSchema>> {
        Self::load(FormConfiguration::from_json(json)?)
    }

    pub fn form_id(&self) -> &FormId {
        &self.config.form_id
    }

    pub fn config(&self) -> &FormConfiguration {
        &self.config
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.config.fields
    }

    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.index.get(id).map(|&i| &self.config.fields[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn template(&self, id: &str) -> Option<&Template> {
        self.config.template(id)
    }

    pub fn pattern(&self, id: &str) -> Option<&Regex> {
        self.patterns.get(id)
    }

    /// Formula bound to a computed field
    pub fn formula(&self, id: &str) -> Option<&Formula> {
        self.formulas.get(id)
    }

    /// Computed fields in declaration order
    pub fn computed_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.config.computed_fields()
    }

    /// Fields whose id or label contains `term`, case-insensitively
    ///
    /// A blank term matches every field.
    pub fn search_fields(&self, term: &str) -> Vec<&FieldDefinition> {
        let needle = term.trim().to_lowercase();
        self.config
            .fields
            .iter()
            .filter(|f| {
                needle.is_empty()
                    || f.label.to_lowercase().contains(&needle)
                    || f.id.as_str().to_lowercase().contains(&needle)
            })
            .collect()
    }
}

fn index_fields(config: &FormConfiguration) -> FormResult<HashMap<FieldId, usize>> {
    let mut index = HashMap::with_capacity(config.fields.len());
    for (i, field) in config.fields.iter().enumerate() {
        if index.insert(field.id.clone(), i).is_some() {
            return Err(SchemaError::DuplicateField(field.id.clone()).into());
        }
    }
    Ok(index)
}

fn check_layout(config: &FormConfiguration, index: &HashMap<FieldId, usize>) -> FormResult<()> {
    let mut tabs = HashSet::new();
    for tab in config.layout.tabs() {
        if !tabs.insert(&tab.id) {
            return Err(SchemaError::Malformed(format!("duplicate tab id {}", tab.id)).into());
        }
    }
    for section in config.layout.sections() {
        for field in &section.fields {
            if !index.contains_key(field) {
                return Err(SchemaError::UnknownFieldReference {
                    location: format!("section {}", section.id),
                    field: field.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn check_dependencies(
    config: &FormConfiguration,
    index: &HashMap<FieldId, usize>,
) -> FormResult<()> {
    for field in &config.fields {
        if let Some(dep) = &field.depends_on {
            if !index.contains_key(&dep.field) {
                return Err(SchemaError::UnknownFieldReference {
                    location: format!("dependsOn of {}", field.id),
                    field: dep.field.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn check_templates(config: &FormConfiguration, index: &HashMap<FieldId, usize>) -> FormResult<()> {
    for template in &config.templates {
        for field in template.field_values.keys() {
            if !index.contains_key(field) {
                return Err(SchemaError::UnknownFieldReference {
                    location: format!("template {}", template.id),
                    field: field.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsync_core::FormError;

    fn doc(fields: &str, extra: &str) -> String {
        format!(
            r#"{{"formId": "deal", "formName": "Deal", "fields": [{}]{}}}"#,
            fields, extra
        )
    }

    fn load_err(json: &str) -> SchemaError {
        match FormSchema::from_json(json) {
            Err(FormError::Schema(e)) => e,
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_valid_schema() {
        let json = doc(
            r#"{"id": "amount", "label": "Amount", "type": "number"},
               {"id": "rate", "label": "Rate", "computed": true, "formula": "rateCalc"}"#,
            r#", "calculations": {"rateCalc": "amount * 0.01"}"#,
        );
        let schema = FormSchema::from_json(&json).unwrap();
        assert_eq!(schema.form_id(), &FormId::new("deal"));
        assert!(schema.contains("amount"));
        assert!(schema.formula("rate").is_some());
        assert!(schema.formula("amount").is_none());
    }

    #[test]
    fn test_duplicate_field() {
        let json = doc(
            r#"{"id": "a", "label": "A"}, {"id": "a", "label": "Again"}"#,
            "",
        );
        assert_eq!(load_err(&json), SchemaError::DuplicateField(FieldId::new("a")));
    }

    #[test]
    fn test_dangling_layout_reference() {
        let json = doc(
            r#"{"id": "a", "label": "A"}"#,
            r#", "layout": {"type": "single", "sections": [{"id": "s", "fields": ["a", "ghost"]}]}"#,
        );
        assert!(matches!(
            load_err(&json),
            SchemaError::UnknownFieldReference { field, .. } if field.as_str() == "ghost"
        ));
    }

    #[test]
    fn test_dangling_dependency() {
        let json = doc(
            r#"{"id": "fee", "label": "Fee",
                "dependsOn": {"field": "kind", "value": "rcf", "showWhen": true}}"#,
            "",
        );
        assert!(matches!(
            load_err(&json),
            SchemaError::UnknownFieldReference { field, .. } if field.as_str() == "kind"
        ));
    }

    #[test]
    fn test_formula_reads_undeclared_field() {
        let json = doc(
            r#"{"id": "rate", "label": "Rate", "computed": true, "formula": "calc"}"#,
            r#", "calculations": {"calc": "amount * 2"}"#,
        );
        assert!(matches!(
            load_err(&json),
            SchemaError::UnknownFieldReference { field, .. } if field.as_str() == "amount"
        ));
    }

    #[test]
    fn test_computed_without_formula() {
        let json = doc(r#"{"id": "rate", "label": "Rate", "computed": true}"#, "");
        assert_eq!(load_err(&json), SchemaError::MissingFormula(FieldId::new("rate")));

        let json = doc(
            r#"{"id": "rate", "label": "Rate", "computed": true, "formula": "nope"}"#,
            "",
        );
        assert!(matches!(load_err(&json), SchemaError::UnknownFormula { .. }));
    }

    #[test]
    fn test_formula_syntax_error() {
        let json = doc(
            r#"{"id": "a", "label": "A"},
               {"id": "rate", "label": "Rate", "computed": true, "formula": "calc"}"#,
            r#", "calculations": {"calc": "a * (2"}"#,
        );
        assert!(matches!(load_err(&json), SchemaError::FormulaSyntax { .. }));
    }

    #[test]
    fn test_invalid_pattern() {
        let json = doc(
            r#"{"id": "code", "label": "Code", "validation": {"pattern": "[a-"}}"#,
            "",
        );
        assert!(matches!(load_err(&json), SchemaError::InvalidPattern { .. }));
    }

    #[test]
    fn test_template_references_undeclared_field() {
        let json = doc(
            r#"{"id": "a", "label": "A"}"#,
            r#", "templates": [{"id": "t", "name": "T", "fieldValues": {"b": 1}}]"#,
        );
        assert!(matches!(load_err(&json), SchemaError::UnknownFieldReference { .. }));
    }

    #[test]
    fn test_search_fields() {
        let json = doc(
            r#"{"id": "amount", "label": "Facility Amount"},
               {"id": "commitmentFee", "label": "Commitment Fee"},
               {"id": "name", "label": "Tranche Name"}"#,
            "",
        );
        let schema = FormSchema::from_json(&json).unwrap();

        let hits: Vec<&str> = schema
            .search_fields("FEE")
            .iter()
            .map(|f| f.id.as_str())
            .collect();
        assert_eq!(hits, vec!["commitmentFee"]);
        assert_eq!(schema.search_fields("amount").len(), 1);
        assert_eq!(schema.search_fields("  ").len(), 3);
    }
}
