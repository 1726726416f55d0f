//! Form registry
//!
//! Process-wide directory of live forms, so the surrounding application
//! can save, validate or reset every open form without holding the
//! sessions itself.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use formsync_core::{FieldValues, FormId, FormResult};

/// What the registry can do to a registered form
pub trait FormControl: Send + Sync {
    fn get_values(&self) -> FormResult<FieldValues>;

    /// Overlay a partial mapping; undeclared ids are ignored
    fn set_values(&self, values: FieldValues) -> FormResult<()>;

    /// Validate the whole form, returning whether it passed
    fn validate(&self) -> FormResult<bool>;

    fn reset(&self) -> FormResult<()>;
}

/// Identifies one registration, so a replaced session cannot remove its
/// successor when it is torn down
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(pub u64);

struct Registration {
    id: RegistrationId,
    control: Arc<dyn FormControl>,
}

#[derive(Clone, Default)]
pub struct FormRegistry {
    forms: Arc<RwLock<BTreeMap<FormId, Registration>>>,
    next_id: Arc<AtomicU64>,
}

impl FormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a form, replacing any previous registration under that id
    pub fn register(&self, form_id: FormId, control: Arc<dyn FormControl>) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let previous = self
            .forms
            .write()
            .insert(form_id.clone(), Registration { id, control });
        if previous.is_some() {
            tracing::warn!(form = %form_id, "form registered twice, replacing earlier registration");
        }
        id
    }

    /// Remove whatever is registered under `form_id`
    pub fn unregister(&self, form_id: &FormId) -> bool {
        self.forms.write().remove(form_id).is_some()
    }

    /// Remove the registration only if it is still `id`
    pub fn unregister_if(&self, form_id: &FormId, id: RegistrationId) -> bool {
        let mut forms = self.forms.write();
        match forms.get(form_id) {
            Some(registration) if registration.id == id => {
                forms.remove(form_id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, form_id: &FormId) -> Option<Arc<dyn FormControl>> {
        self.forms
            .read()
            .get(form_id)
            .map(|r| Arc::clone(&r.control))
    }

    pub fn contains(&self, form_id: &FormId) -> bool {
        self.forms.read().contains_key(form_id)
    }

    pub fn form_ids(&self) -> Vec<FormId> {
        self.forms.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.forms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.read().is_empty()
    }

    // Controls are called outside the lock: a form may touch the registry
    // while it validates or resets.
    fn controls(&self) -> Vec<(FormId, Arc<dyn FormControl>)> {
        self.forms
            .read()
            .iter()
            .map(|(id, r)| (id.clone(), Arc::clone(&r.control)))
            .collect()
    }

    /// Validate every registered form
    pub fn validate_all(&self) -> BTreeMap<FormId, FormResult<bool>> {
        self.controls()
            .into_iter()
            .map(|(id, control)| (id, control.validate()))
            .collect()
    }

    /// Reset every registered form, returning how many succeeded
    pub fn reset_all(&self) -> usize {
        self.controls()
            .into_iter()
            .filter(|(id, control)| match control.reset() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(form = %id, error = %e, "reset failed");
                    false
                }
            })
            .count()
    }

    /// Current values of every registered form
    pub fn collect_values(&self) -> BTreeMap<FormId, FieldValues> {
        self.controls()
            .into_iter()
            .filter_map(|(id, control)| control.get_values().ok().map(|v| (id, v)))
            .collect()
    }
}

impl std::fmt::Debug for FormRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormRegistry")
            .field("forms", &self.form_ids())
            .finish()
    }
}
