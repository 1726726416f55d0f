//! Schema fixtures

use std::sync::Arc;

use formsync_core::FormResult;
use formsync_state::FormSchema;

/// Loan tranche form: tabbed layout, a conditional field, a computed
/// field and two templates
pub const TRANCHE_FORM: &str = r#"{
    "formId": "tranche",
    "formName": "Tranche",
    "fields": [
        {"id": "name", "label": "Tranche Name", "type": "text", "required": true},
        {"id": "kind", "label": "Tranche Type", "type": "select", "defaultValue": "term",
         "options": [{"value": "term", "label": "Term Loan"}, {"value": "rcf", "label": "Revolver"}]},
        {"id": "currency", "label": "Currency", "type": "select", "defaultValue": "USD",
         "options": ["USD", "EUR", "GBP"],
         "validation": {"pattern": "^[A-Z]{3}$", "message": "Use an ISO currency code"}},
        {"id": "amount", "label": "Amount", "type": "number", "required": true,
         "validation": {"min": 0}},
        {"id": "margin", "label": "Margin", "type": "number",
         "validation": {"min": 0, "max": 10}},
        {"id": "fee", "label": "Commitment Fee", "type": "number", "required": true,
         "dependsOn": {"field": "kind", "value": "rcf", "showWhen": true}},
        {"id": "amortization", "label": "Amortization", "type": "text",
         "dependsOn": {"field": "kind", "value": "rcf", "showWhen": false}},
        {"id": "rate", "label": "Rate", "type": "number", "computed": true, "formula": "rateCalc"},
        {"id": "allIn", "label": "All-in Spread", "type": "number", "computed": true,
         "formula": "allInCalc"}
    ],
    "layout": {"type": "tabbed", "tabs": [
        {"id": "basic", "label": "Basic", "sections": [
            {"id": "info", "title": "Basic Information", "fields": ["name", "kind", "currency"]}
        ]},
        {"id": "pricing", "label": "Pricing", "sections": [
            {"id": "size", "title": "Size", "fields": ["amount", "rate"]},
            {"id": "spread", "title": "Spread", "fields": ["margin", "fee", "allIn"]}
        ]},
        {"id": "terms", "label": "Terms", "sections": [
            {"id": "repayment", "title": "Repayment", "fields": ["amortization"]}
        ]}
    ]},
    "templates": [
        {"id": "standard", "name": "Standard Term", "fieldValues": {"kind": "term", "margin": 2.5}},
        {"id": "revolver", "name": "Revolver", "fieldValues": {"kind": "rcf", "fee": 0.35, "currency": "EUR"}}
    ],
    "calculations": {
        "rateCalc": "amount * 0.01",
        "allInCalc": "kind === 'rcf' ? margin + fee : margin"
    }
}"#;

/// `amount` (required, numeric, min 0) and `rate = amount * 0.01`
pub const AMOUNT_RATE_FORM: &str = r#"{
    "formId": "pricing",
    "formName": "Pricing",
    "fields": [
        {"id": "amount", "label": "Amount", "type": "number", "required": true,
         "validation": {"min": 0}},
        {"id": "rate", "label": "Rate", "type": "number", "computed": true, "formula": "rateCalc"}
    ],
    "calculations": {"rateCalc": "amount * 0.01"}
}"#;

/// One required field and nothing else
pub const REQUIRED_ONLY_FORM: &str = r#"{
    "formId": "contact",
    "formName": "Contact",
    "fields": [
        {"id": "name", "label": "Name", "required": true}
    ]
}"#;

pub fn tranche_schema() -> FormResult<Arc<FormSchema>> {
    FormSchema::from_json(TRANCHE_FORM)
}

pub fn amount_rate_schema() -> FormResult<Arc<FormSchema>> {
    FormSchema::from_json(AMOUNT_RATE_FORM)
}

pub fn required_only_schema() -> FormResult<Arc<FormSchema>> {
    FormSchema::from_json(REQUIRED_ONLY_FORM)
}
