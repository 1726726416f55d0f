//! Schema document
//!
//! The declarative description of a form as supplied by the surrounding
//! application. These types carry no logic beyond lookups; reference
//! checking happens when a document is compiled into a `FormSchema`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{FieldId, FieldValue, FieldValues, FormId, FormResult, SchemaError, TabId};

/// Complete form description
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormConfiguration {
    pub form_id: FormId,
    pub form_name: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub templates: Vec<Template>,
    /// Formula name -> expression body
    #[serde(default)]
    pub calculations: BTreeMap<String, String>,
}

impl FormConfiguration {
    /// Parse a JSON schema document
    pub fn from_json(json: &str) -> FormResult<Self> {
        serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()).into())
    }

    /// Serialize back to JSON
    pub fn to_json(&self) -> FormResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SchemaError::Malformed(e.to_string()).into())
    }

    /// Look up a field definition
    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id.as_str() == id)
    }

    /// Look up a template
    pub fn template(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Iterate over computed fields in declaration order
    pub fn computed_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.computed)
    }
}

/// Input widget kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Textarea,
    Number,
    Date,
    Select,
    Checkbox,
    Email,
    #[serde(other)]
    Other,
}

/// One field of a form
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub id: FieldId,
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Dependency>,
    #[serde(default)]
    pub computed: bool,
    /// Name of an entry in `calculations`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl FieldDefinition {
    /// Value the field starts with when no initial value is supplied
    pub fn initial_value(&self) -> FieldValue {
        self.default_value.clone().unwrap_or_else(FieldValue::empty)
    }
}

/// Choice offered by a select field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectOption {
    Plain(String),
    Labeled { value: FieldValue, label: String },
}

impl SelectOption {
    pub fn value(&self) -> FieldValue {
        match self {
            SelectOption::Plain(s) => FieldValue::Text(s.clone()),
            SelectOption::Labeled { value, .. } => value.clone(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SelectOption::Plain(s) => s,
            SelectOption::Labeled { label, .. } => label,
        }
    }
}

/// Per-field validation rules, checked in the order pattern, min, max
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Visibility predicate: visible iff (`field` == `value`) == `show_when`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub field: FieldId,
    pub value: FieldValue,
    pub show_when: bool,
}

/// Layout of the form's fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layout {
    Tabbed { tabs: Vec<Tab> },
    Single {
        #[serde(default)]
        sections: Vec<Section>,
    },
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Single {
            sections: Vec::new(),
        }
    }
}

impl Layout {
    pub fn is_tabbed(&self) -> bool {
        matches!(self, Layout::Tabbed { .. })
    }

    pub fn tabs(&self) -> &[Tab] {
        match self {
            Layout::Tabbed { tabs } => tabs,
            Layout::Single { .. } => &[],
        }
    }

    pub fn tab(&self, id: &str) -> Option<&Tab> {
        self.tabs().iter().find(|t| t.id.as_str() == id)
    }

    /// Tab selected when a session starts
    pub fn first_tab(&self) -> Option<&TabId> {
        self.tabs().first().map(|t| &t.id)
    }

    /// Every section, across all tabs
    pub fn sections(&self) -> Vec<&Section> {
        match self {
            Layout::Tabbed { tabs } => tabs.iter().flat_map(|t| t.sections.iter()).collect(),
            Layout::Single { sections } => sections.iter().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub label: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FieldId>,
}

/// Named preset of field values
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub field_values: FieldValues,
}
