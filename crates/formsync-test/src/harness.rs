//! Multi-collaborator harness
//!
//! Every collaborator gets its own synchronizer, registry and sessions on
//! one shared in-memory channel. Delivery is driven explicitly with
//! `settle`, so a test decides exactly where remote edits interleave with
//! local ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use formsync_core::{FieldValue, FieldValues, FormError, FormId, FormResult, UserId};
use formsync_state::{
    Diagnostic, Diagnostics, FormRegistry, FormSchema, FormSession, SessionConfig,
    SessionServices,
};
use formsync_sync::{CollabChannel, InMemoryChannel, SyncConfig, SyncStats, Synchronizer};

/// Upper bound on pump rounds in `settle`
const MAX_SETTLE_ROUNDS: usize = 64;

/// One simulated user
pub struct Collaborator {
    pub user_id: UserId,
    pub synchronizer: Synchronizer,
    pub registry: FormRegistry,
    sessions: BTreeMap<FormId, FormSession>,
    diagnostics: Diagnostics,
    reported: Arc<Mutex<Vec<Diagnostic>>>,
}

impl Collaborator {
    fn new(user_id: UserId, channel: Arc<dyn CollabChannel>) -> Self {
        let (diagnostics, reported) = Diagnostics::collecting();
        Collaborator {
            synchronizer: Synchronizer::new(channel, SyncConfig::for_user(user_id.clone())),
            registry: FormRegistry::new(),
            sessions: BTreeMap::new(),
            diagnostics,
            reported,
            user_id,
        }
    }

    pub fn session(&self, form_id: &FormId) -> Option<&FormSession> {
        self.sessions.get(form_id)
    }

    /// Diagnostics reported by this user's sessions so far
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.reported.lock().clone()
    }
}

pub struct CollabHarness {
    channel: Arc<InMemoryChannel>,
    collaborators: BTreeMap<UserId, Collaborator>,
}

impl Default for CollabHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl CollabHarness {
    pub fn new() -> Self {
        CollabHarness {
            channel: Arc::new(InMemoryChannel::new()),
            collaborators: BTreeMap::new(),
        }
    }

    /// Harness with the given users already joined
    pub fn with_users<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        let mut harness = Self::new();
        for user in users {
            harness.join(user);
        }
        harness
    }

    pub fn channel(&self) -> &Arc<InMemoryChannel> {
        &self.channel
    }

    pub fn join(&mut self, user: impl Into<UserId>) -> &Collaborator {
        let user_id = user.into();
        let channel: Arc<dyn CollabChannel> = self.channel.clone();
        self.collaborators
            .entry(user_id.clone())
            .or_insert_with(|| Collaborator::new(user_id, channel))
    }

    pub fn users(&self) -> Vec<UserId> {
        self.collaborators.keys().cloned().collect()
    }

    pub fn collaborator(&self, user: &str) -> Option<&Collaborator> {
        self.collaborators.get(user)
    }

    fn collaborator_or_err(&self, user: &str) -> FormResult<&Collaborator> {
        self.collaborators
            .get(user)
            .ok_or_else(|| FormError::Channel(format!("{} has not joined", user)))
    }

    /// Open a form for one user
    pub fn open(&mut self, user: &str, schema: Arc<FormSchema>, initial: FieldValues) -> FormResult<()> {
        let collaborator = self
            .collaborators
            .get_mut(user)
            .ok_or_else(|| FormError::Channel(format!("{} has not joined", user)))?;
        let services = SessionServices::new()
            .with_registry(collaborator.registry.clone())
            .with_synchronizer(collaborator.synchronizer.clone())
            .with_diagnostics(collaborator.diagnostics.clone());
        let session = FormSession::new(
            Arc::clone(&schema),
            initial,
            SessionConfig::for_user(collaborator.user_id.clone()),
            services,
        );
        collaborator.sessions.insert(schema.form_id().clone(), session);
        Ok(())
    }

    /// Open a form for every joined user
    pub fn open_all(&mut self, schema: Arc<FormSchema>, initial: FieldValues) -> FormResult<()> {
        for user in self.users() {
            self.open(user.as_str(), Arc::clone(&schema), initial.clone())?;
        }
        Ok(())
    }

    pub fn session(&self, user: &str, form_id: &FormId) -> FormResult<&FormSession> {
        self.collaborator_or_err(user)?
            .session(form_id)
            .ok_or_else(|| FormError::UnknownForm(form_id.clone()))
    }

    pub fn set_field(
        &self,
        user: &str,
        form_id: &FormId,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        self.session(user, form_id)?.set_field(field, value)
    }

    pub fn values(&self, user: &str, form_id: &FormId) -> FormResult<FieldValues> {
        self.session(user, form_id)?.values()
    }

    /// Destroy one user's session and forget it
    pub fn close(&mut self, user: &str, form_id: &FormId) -> FormResult<()> {
        let session = self
            .collaborators
            .get_mut(user)
            .and_then(|c| c.sessions.remove(form_id))
            .ok_or_else(|| FormError::UnknownForm(form_id.clone()))?;
        session.destroy()
    }

    /// Deliver everything in flight, repeatedly, until the channel is quiet
    ///
    /// Returns the number of frames handled.
    pub fn settle(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let handled: usize = self
                .collaborators
                .values()
                .map(|c| c.synchronizer.pump())
                .sum();
            if handled == 0 {
                break;
            }
            total += handled;
        }
        total
    }

    /// Whether every open session of `form_id` holds the same values
    pub fn converged(&self, form_id: &FormId) -> bool {
        let mut snapshots = self
            .collaborators
            .values()
            .filter_map(|c| c.session(form_id))
            .filter_map(|s| s.values().ok());
        match snapshots.next() {
            Some(first) => snapshots.all(|other| other == first),
            None => true,
        }
    }

    pub fn stats(&self) -> BTreeMap<UserId, SyncStats> {
        self.collaborators
            .iter()
            .map(|(id, c)| (id.clone(), c.synchronizer.stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{amount_rate_schema, tranche_schema};

    #[test]
    fn test_remote_edit_without_echo() {
        let mut harness = CollabHarness::with_users(["s1", "s2"]);
        let schema = tranche_schema().unwrap();
        let form = schema.form_id().clone();
        harness.open_all(schema, FieldValues::new()).unwrap();

        harness.set_field("s1", &form, "name", "Alpha").unwrap();
        harness.settle();

        assert_eq!(
            harness.values("s2", &form).unwrap()["name"],
            FieldValue::from("Alpha")
        );
        let stats = harness.stats();
        assert_eq!(stats[&UserId::new("s1")].published, 1);
        assert_eq!(stats[&UserId::new("s2")].published, 0);
        assert_eq!(stats[&UserId::new("s2")].delivered, 1);
        assert_eq!(stats[&UserId::new("s1")].delivered, 0);
        assert!(harness.converged(&form));
    }

    #[test]
    fn test_computed_side_effects_are_not_published() {
        let mut harness = CollabHarness::with_users(["alice", "bob"]);
        let schema = amount_rate_schema().unwrap();
        let form = schema.form_id().clone();
        harness.open_all(schema, FieldValues::new()).unwrap();

        harness.set_field("alice", &form, "amount", "250").unwrap();
        harness.settle();

        // Bob derives rate himself from the raw edit
        assert_eq!(harness.stats()[&UserId::new("alice")].published, 1);
        assert_eq!(
            harness.values("bob", &form).unwrap()["rate"],
            FieldValue::Number(2.5)
        );
        assert!(harness.converged(&form));
    }

    #[test]
    fn test_closed_session_receives_nothing() {
        let mut harness = CollabHarness::with_users(["alice", "bob"]);
        let schema = tranche_schema().unwrap();
        let form = schema.form_id().clone();
        harness.open_all(schema, FieldValues::new()).unwrap();

        harness.close("bob", &form).unwrap();
        assert!(harness.collaborator("bob").unwrap().registry.is_empty());

        harness.set_field("alice", &form, "name", "Alpha").unwrap();
        harness.settle();
        assert_eq!(harness.stats()[&UserId::new("bob")].delivered, 0);
        assert_eq!(harness.stats()[&UserId::new("bob")].unrouted, 1);
    }

    #[test]
    fn test_interleaved_edits_resolve_by_arrival() {
        let mut harness = CollabHarness::with_users(["alice", "bob"]);
        let schema = tranche_schema().unwrap();
        let form = schema.form_id().clone();
        harness.open_all(schema, FieldValues::new()).unwrap();

        // Both write before either hears from the other: each ends up with
        // the other's value, whole-field last write wins per receiver
        harness.set_field("alice", &form, "name", "A").unwrap();
        harness.set_field("bob", &form, "name", "B").unwrap();
        harness.settle();

        assert_eq!(harness.values("alice", &form).unwrap()["name"], FieldValue::from("B"));
        assert_eq!(harness.values("bob", &form).unwrap()["name"], FieldValue::from("A"));
        assert!(!harness.converged(&form));
    }
}
