//! Scripted collaboration scenarios
//!
//! A scenario is a list of steps played against a fresh harness. Steps
//! only deliver remote edits where the script says `settle`.

use std::collections::BTreeMap;
use std::sync::Arc;

use formsync_core::{FieldValue, FieldValues, FormError, FormResult, UserId};
use formsync_state::FormSchema;
use formsync_sync::SyncStats;

use crate::harness::CollabHarness;

#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Edit {
        user: UserId,
        field: String,
        value: FieldValue,
    },
    Template {
        user: UserId,
        template: String,
    },
    Focus {
        user: UserId,
        field: String,
    },
    Blur {
        user: UserId,
        field: String,
    },
    Reset {
        user: UserId,
    },
    Close {
        user: UserId,
    },
    /// Deliver everything in flight
    Settle,
}

pub struct Scenario {
    schema: Arc<FormSchema>,
    users: Vec<UserId>,
    initial: FieldValues,
    steps: Vec<Step>,
}

/// What every collaborator ended up with
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Values per user whose session is still open
    pub values: BTreeMap<UserId, FieldValues>,
    pub stats: BTreeMap<UserId, SyncStats>,
    pub converged: bool,
}

impl ScenarioReport {
    pub fn value(&self, user: &str, field: &str) -> Option<&FieldValue> {
        self.values.get(user).and_then(|values| values.get(field))
    }
}

impl Scenario {
    pub fn new(schema: Arc<FormSchema>) -> Self {
        Scenario {
            schema,
            users: Vec::new(),
            initial: FieldValues::new(),
            steps: Vec::new(),
        }
    }

    pub fn users<I, U>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        self.users.extend(users.into_iter().map(Into::into));
        self
    }

    pub fn initial(mut self, initial: FieldValues) -> Self {
        self.initial = initial;
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn edit(self, user: &str, field: &str, value: impl Into<FieldValue>) -> Self {
        self.step(Step::Edit {
            user: UserId::new(user),
            field: field.to_string(),
            value: value.into(),
        })
    }

    pub fn template(self, user: &str, template: &str) -> Self {
        self.step(Step::Template {
            user: UserId::new(user),
            template: template.to_string(),
        })
    }

    pub fn settle(self) -> Self {
        self.step(Step::Settle)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Play the script on a fresh harness
    pub fn run(&self) -> FormResult<ScenarioReport> {
        let mut harness = CollabHarness::with_users(self.users.iter().cloned());
        harness.open_all(Arc::clone(&self.schema), self.initial.clone())?;
        let form = self.schema.form_id().clone();

        for step in &self.steps {
            match step {
                Step::Edit { user, field, value } => {
                    harness.set_field(user.as_str(), &form, field, value.clone())?;
                }
                Step::Template { user, template } => {
                    if !harness.session(user.as_str(), &form)?.apply_template(template)? {
                        return Err(FormError::Config(format!("unknown template {}", template)));
                    }
                }
                Step::Focus { user, field } => {
                    harness.session(user.as_str(), &form)?.focus_field(field.as_str())?;
                }
                Step::Blur { user, field } => {
                    harness.session(user.as_str(), &form)?.blur_field(field.as_str())?;
                }
                Step::Reset { user } => harness.session(user.as_str(), &form)?.reset()?,
                Step::Close { user } => harness.close(user.as_str(), &form)?,
                Step::Settle => {
                    harness.settle();
                }
            }
        }

        let values = self
            .users
            .iter()
            .filter_map(|user| {
                harness
                    .values(user.as_str(), &form)
                    .ok()
                    .map(|v| (user.clone(), v))
            })
            .collect();

        Ok(ScenarioReport {
            values,
            stats: harness.stats(),
            converged: harness.converged(&form),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::tranche_schema;

    #[test]
    fn test_settled_script_converges() {
        let report = Scenario::new(tranche_schema().unwrap())
            .users(["alice", "bob", "carol"])
            .edit("alice", "name", "Senior A")
            .settle()
            .edit("bob", "amount", "1000000")
            .settle()
            .edit("carol", "kind", "rcf")
            .settle()
            .run()
            .unwrap();

        assert!(report.converged);
        assert_eq!(report.value("carol", "name"), Some(&FieldValue::from("Senior A")));
        assert_eq!(report.value("alice", "rate"), Some(&FieldValue::Number(10000.0)));
        assert_eq!(report.value("bob", "kind"), Some(&FieldValue::from("rcf")));
    }

    #[test]
    fn test_templates_stay_local() {
        let report = Scenario::new(tranche_schema().unwrap())
            .users(["alice", "bob"])
            .template("alice", "revolver")
            .settle()
            .run()
            .unwrap();

        assert_eq!(report.value("alice", "kind"), Some(&FieldValue::from("rcf")));
        assert_eq!(report.value("bob", "kind"), Some(&FieldValue::from("term")));
        assert!(!report.converged);
    }

    #[test]
    fn test_closed_user_is_not_reported() {
        let report = Scenario::new(tranche_schema().unwrap())
            .users(["alice", "bob"])
            .step(Step::Close {
                user: UserId::new("bob"),
            })
            .edit("alice", "name", "Solo")
            .settle()
            .run()
            .unwrap();

        assert_eq!(report.values.len(), 1);
        assert!(report.converged);
    }

    #[test]
    fn test_unknown_template_fails_the_run() {
        let result = Scenario::new(tranche_schema().unwrap())
            .users(["alice"])
            .template("alice", "bogus")
            .run();
        assert!(matches!(result, Err(FormError::Config(_))));
    }
}
