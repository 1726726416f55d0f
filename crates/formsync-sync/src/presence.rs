//! Editing presence - who is focused on which field
//!
//! Presence is advisory. It never blocks an edit and is not part of the
//! form state; it only tells a renderer which collaborators are where.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use formsync_core::{FieldId, FormId, UserId};

/// Field id -> users currently focused on it
pub type EditingPresence = BTreeMap<FieldId, BTreeSet<UserId>>;

/// Presence across all forms
#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    /// Form -> (Field -> Users)
    forms: HashMap<FormId, EditingPresence>,

    /// User -> fields they are focused on
    user_fields: HashMap<UserId, HashSet<(FormId, FieldId)>>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a user focused a field
    pub fn focus(&mut self, form_id: &FormId, field_id: &FieldId, user: &UserId) {
        self.forms
            .entry(form_id.clone())
            .or_default()
            .entry(field_id.clone())
            .or_default()
            .insert(user.clone());

        self.user_fields
            .entry(user.clone())
            .or_default()
            .insert((form_id.clone(), field_id.clone()));
    }

    /// Record that a user left a field
    pub fn blur(&mut self, form_id: &FormId, field_id: &FieldId, user: &UserId) {
        if let Some(fields) = self.forms.get_mut(form_id) {
            if let Some(users) = fields.get_mut(field_id) {
                users.remove(user);
                if users.is_empty() {
                    fields.remove(field_id);
                }
            }
            if fields.is_empty() {
                self.forms.remove(form_id);
            }
        }
        if let Some(entries) = self.user_fields.get_mut(user) {
            entries.remove(&(form_id.clone(), field_id.clone()));
            if entries.is_empty() {
                self.user_fields.remove(user);
            }
        }
    }

    /// Remove a user from every field of one form (session teardown)
    pub fn leave(&mut self, form_id: &FormId, user: &UserId) {
        let fields: Vec<FieldId> = self
            .user_fields
            .get(user)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(form, _)| form == form_id)
                    .map(|(_, field)| field.clone())
                    .collect()
            })
            .unwrap_or_default();

        for field in fields {
            self.blur(form_id, &field, user);
        }
    }

    /// Users focused on a field
    pub fn editors(&self, form_id: &FormId, field_id: &FieldId) -> Vec<UserId> {
        self.forms
            .get(form_id)
            .and_then(|fields| fields.get(field_id))
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Presence snapshot for one form
    pub fn snapshot(&self, form_id: &FormId) -> EditingPresence {
        self.forms.get(form_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (FormId, FieldId, FieldId) {
        (FormId::new("deal"), FieldId::new("amount"), FieldId::new("rate"))
    }

    #[test]
    fn test_focus_and_blur() {
        let (form, amount, _) = ids();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let mut map = PresenceMap::new();

        map.focus(&form, &amount, &alice);
        map.focus(&form, &amount, &bob);
        assert_eq!(map.editors(&form, &amount), vec![alice.clone(), bob.clone()]);

        map.blur(&form, &amount, &alice);
        assert_eq!(map.editors(&form, &amount), vec![bob]);
        assert!(!map.snapshot(&form)[&amount].contains(&alice));
    }

    #[test]
    fn test_leave_clears_only_that_form() {
        let (form, amount, rate) = ids();
        let other = FormId::new("other");
        let alice = UserId::new("alice");
        let mut map = PresenceMap::new();

        map.focus(&form, &amount, &alice);
        map.focus(&form, &rate, &alice);
        map.focus(&other, &amount, &alice);

        map.leave(&form, &alice);
        assert!(map.snapshot(&form).is_empty());
        assert_eq!(map.editors(&other, &amount), vec![alice]);
    }
}
