//! Property tests over the whole engine

use std::sync::Arc;

use proptest::prelude::*;

use formsync_core::{FieldId, FieldValue, FieldValues, FormError, FormId, RemoteEdit, UserId};
use formsync_state::{
    is_hidden, validate, Diagnostics, FormSchema, FormSession, Visibility,
};

use crate::fixtures::{amount_rate_schema, required_only_schema, tranche_schema};
use crate::harness::CollabHarness;
use crate::invariants::{no_errors_on_hidden, state_consistent, template_overlay_holds};

const FIELDS: &[&str] = &[
    "name",
    "kind",
    "currency",
    "amount",
    "margin",
    "fee",
    "amortization",
    "rate",
    "allIn",
];

fn schema() -> Arc<FormSchema> {
    tranche_schema().expect("tranche fixture loads")
}

fn value() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        (-1_000.0..1_000_000.0f64).prop_map(FieldValue::Number),
        "[a-zA-Z0-9 ]{0,8}".prop_map(FieldValue::Text),
        prop::sample::select(vec!["rcf", "term", "USD", "eur", "-1", "", "5"])
            .prop_map(FieldValue::from),
    ]
}

fn field() -> impl Strategy<Value = &'static str> {
    prop::sample::select(FIELDS.to_vec())
}

fn values() -> impl Strategy<Value = FieldValues> {
    prop::collection::vec(value(), FIELDS.len()).prop_map(|vs| {
        FIELDS
            .iter()
            .zip(vs)
            .map(|(id, v)| (FieldId::new(*id), v))
            .collect()
    })
}

fn partial_values() -> impl Strategy<Value = FieldValues> {
    prop::collection::btree_map(field().prop_map(FieldId::new), value(), 0..4)
}

#[derive(Clone, Debug)]
enum Op {
    Local(&'static str, FieldValue),
    Remote(&'static str, FieldValue),
    Template(&'static str),
    Tab(&'static str),
    Validate,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (field(), value()).prop_map(|(f, v)| Op::Local(f, v)),
        2 => (field(), value()).prop_map(|(f, v)| Op::Remote(f, v)),
        1 => prop::sample::select(vec!["standard", "revolver", "missing"]).prop_map(Op::Template),
        1 => prop::sample::select(vec!["basic", "pricing", "terms"]).prop_map(Op::Tab),
        1 => Just(Op::Validate),
    ]
}

fn apply(session: &FormSession, op: &Op) -> Result<(), FormError> {
    match op {
        Op::Local(field, value) => session.set_field(*field, value.clone()),
        Op::Remote(field, value) => {
            let edit = RemoteEdit::new(
                session.form_id().clone(),
                FieldId::new(*field),
                value.clone(),
                UserId::new("remote"),
            );
            session.apply_remote_edit(&edit).map(|_| ())
        }
        Op::Template(id) => session.apply_template(id).map(|_| ()),
        Op::Tab(id) => session.select_tab(*id),
        Op::Validate => session.validate_all().map(|_| ()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn fields_without_dependency_are_never_hidden(assignment in values()) {
        let schema = schema();
        for field in schema.fields().iter().filter(|f| f.depends_on.is_none()) {
            prop_assert!(!is_hidden(field, &assignment));
        }
    }

    #[test]
    fn dependency_visibility_follows_equality(assignment in values()) {
        let schema = schema();
        let kind_is_rcf = assignment.get("kind") == Some(&FieldValue::from("rcf"));

        // fee: showWhen true, amortization: showWhen false
        let fee = schema.field("fee").expect("fee declared");
        let amortization = schema.field("amortization").expect("amortization declared");
        prop_assert_eq!(!is_hidden(fee, &assignment), kind_is_rcf);
        prop_assert_eq!(!is_hidden(amortization, &assignment), !kind_is_rcf);
    }

    #[test]
    fn validation_never_reports_hidden_fields(assignment in values()) {
        let schema = schema();
        let visibility = Visibility::resolve(&schema, &assignment, &Diagnostics::new());
        let report = validate(&schema, &assignment, &visibility);
        prop_assert!(no_errors_on_hidden(&schema, &assignment, &report.errors));
    }

    #[test]
    fn template_sets_its_keys_and_nothing_else(
        initial in partial_values(),
        template in prop::sample::select(vec!["standard", "revolver"]),
    ) {
        let schema = schema();
        let session = FormSession::standalone(Arc::clone(&schema), initial);
        let before = session.values().unwrap();

        prop_assert!(session.apply_template(template).unwrap());
        // Computed fields follow from the merge, everything else must match
        let mut after = session.values().unwrap();
        for computed in schema.computed_fields() {
            after.insert(computed.id.clone(), before[&computed.id].clone());
        }
        prop_assert!(template_overlay_holds(&schema, template, &before, &after));
    }

    #[test]
    fn state_stays_consistent(initial in partial_values(), ops in prop::collection::vec(op(), 0..24)) {
        let schema = schema();
        let session = FormSession::standalone(Arc::clone(&schema), initial);
        for op in &ops {
            let _ = apply(&session, op);
            prop_assert!(state_consistent(&schema, &session.state().unwrap()));
        }
    }

    #[test]
    fn reset_restores_construction_values(
        initial in partial_values(),
        ops in prop::collection::vec(op(), 0..24),
    ) {
        let session = FormSession::standalone(schema(), initial);
        let baseline = session.values().unwrap();

        for op in &ops {
            let _ = apply(&session, op);
        }
        session.reset().unwrap();
        prop_assert_eq!(session.values().unwrap(), baseline.clone());
        prop_assert!(!session.is_dirty().unwrap());
        prop_assert!(session.errors().unwrap().is_empty());

        session.reset().unwrap();
        prop_assert_eq!(session.values().unwrap(), baseline);
    }

    #[test]
    fn submit_only_succeeds_on_valid_forms(
        initial in partial_values(),
        ops in prop::collection::vec(op(), 0..16),
    ) {
        let schema = schema();
        let session = FormSession::standalone(Arc::clone(&schema), initial);
        for op in &ops {
            let _ = apply(&session, op);
        }

        let values = session.values().unwrap();
        let visibility = Visibility::resolve(&schema, &values, &Diagnostics::new());
        let valid = validate(&schema, &values, &visibility).is_valid();

        let mut calls = 0;
        let result = session.submit(|_| calls += 1);
        prop_assert_eq!(calls, usize::from(valid));
        prop_assert_eq!(result.is_ok(), valid);
        if !valid {
            prop_assert!(matches!(result, Err(FormError::ValidationFailed(_))));
        }
    }

    #[test]
    fn required_field_submits_exactly_once(name in "[a-zA-Z][a-zA-Z ]{0,11}") {
        let session = FormSession::standalone(
            required_only_schema().expect("fixture loads"),
            FieldValues::new(),
        );
        session.set_field("name", name.as_str()).unwrap();

        let mut submitted = Vec::new();
        session.submit(|values| submitted.push(values.clone())).unwrap();
        prop_assert_eq!(submitted.len(), 1);
        prop_assert_eq!(&submitted[0]["name"], &FieldValue::from(name.as_str()));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn settled_edits_converge(
        edits in prop::collection::vec((0usize..3, field(), value()), 1..12),
    ) {
        let users = ["alice", "bob", "carol"];
        let mut harness = CollabHarness::with_users(users);
        let schema = schema();
        let form = schema.form_id().clone();
        harness.open_all(schema, FieldValues::new()).unwrap();

        for (who, field, value) in edits {
            harness.set_field(users[who], &form, field, value).unwrap();
            harness.settle();
        }
        prop_assert!(harness.converged(&form));
    }
}

#[test]
fn amount_and_rate_scenario() {
    let session = FormSession::standalone(amount_rate_schema().unwrap(), FieldValues::new());

    session.set_field("amount", "5000000").unwrap();
    assert_eq!(session.value("rate").unwrap(), FieldValue::Number(50000.0));
    assert!(session.validate_all().unwrap());
    assert!(!session.errors().unwrap().contains_key("amount"));

    session.set_field("amount", "-1").unwrap();
    assert!(session.errors().unwrap().contains_key("amount"));
    let mut called = false;
    assert!(matches!(
        session.submit(|_| called = true),
        Err(FormError::ValidationFailed(errors)) if errors.contains_key("amount")
    ));
    assert!(!called);
}

#[test]
fn remote_edit_scenario() {
    let mut harness = CollabHarness::with_users(["s1", "s2"]);
    let schema = tranche_schema().unwrap();
    let form = FormId::new("tranche");
    harness.open_all(schema, FieldValues::new()).unwrap();

    harness.set_field("s1", &form, "name", "Alpha").unwrap();
    harness.settle();

    let s2 = harness.session("s2", &form).unwrap();
    assert_eq!(s2.value("name").unwrap(), FieldValue::from("Alpha"));
    assert_eq!(
        s2.last_writer("name").unwrap().map(|w| w.user_id),
        Some(UserId::new("s1"))
    );
    assert_eq!(harness.stats()[&UserId::new("s2")].published, 0);
}
