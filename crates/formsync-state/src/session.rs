//! Form session
//!
//! The single owner of one form's state. Every mutating operation runs the
//! same synchronous pipeline: write values, recompute derived fields,
//! re-validate visible fields, then notify observers. Local edits are
//! published afterwards; remote edits go through the same pipeline but are
//! never re-published.
//!
//! ```text
//! Ready --set_field/apply_template--> Dirty --submit ok/reset--> Ready
//!   \______________________ destroy ________________________/--> Destroyed
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use formsync_core::{
    now_millis, FieldErrors, FieldId, FieldType, FieldValue, FieldValues, FormError, FormId,
    FormResult, Layout, RemoteEdit, Section, TabId, UserId,
};
use formsync_sync::{EditingPresence, SubscriptionId, Synchronizer};

use crate::computed::recompute;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::registry::{FormControl, FormRegistry, RegistrationId};
use crate::schema::FormSchema;
use crate::template;
use crate::validation::validate;
use crate::visibility::Visibility;

/// Per-session settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Who local edits are attributed to
    pub user_id: UserId,
    /// Reject local value changes; remote edits still apply
    pub read_only: bool,
    /// Publish local edits and apply remote ones when a synchronizer is
    /// attached
    pub collaborative: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            user_id: UserId::new("local"),
            read_only: false,
            collaborative: true,
        }
    }
}

impl SessionConfig {
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        SessionConfig {
            user_id: user_id.into(),
            ..SessionConfig::default()
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_collaborative(mut self, collaborative: bool) -> Self {
        self.collaborative = collaborative;
        self
    }
}

/// Shared services a session plugs into
#[derive(Clone, Debug, Default)]
pub struct SessionServices {
    pub registry: Option<FormRegistry>,
    pub synchronizer: Option<Synchronizer>,
    pub diagnostics: Diagnostics,
}

impl SessionServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: FormRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_synchronizer(mut self, synchronizer: Synchronizer) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Ready,
    Dirty,
    Destroyed,
}

/// Snapshot of a form's state
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub form_id: FormId,
    pub values: FieldValues,
    pub errors: FieldErrors,
    pub is_dirty: bool,
    pub active_tab: Option<TabId>,
}

/// Last applied write to a field
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldWrite {
    pub user_id: UserId,
    pub timestamp: i64,
}

/// Why observers are being notified
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeCause {
    LocalEdit(FieldId),
    RemoteEdit { field_id: FieldId, origin: UserId },
    Template(String),
    ValuesSet,
    Validated,
    Submitted,
    Reset,
    TabSelected(TabId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    pub cause: ChangeCause,
    pub state: FormState,
}

pub type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u64);

/// One visible field as a renderer needs it
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub id: FieldId,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub computed: bool,
    pub value: FieldValue,
    pub error: Option<String>,
    /// Collaborators currently focused on the field
    pub editors: Vec<UserId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectionView {
    pub id: String,
    pub title: String,
    pub fields: Vec<FieldView>,
}

struct SessionState {
    lifecycle: Lifecycle,
    values: FieldValues,
    errors: FieldErrors,
    active_tab: Option<TabId>,
    /// Values present at construction, restored by `reset`
    baseline: FieldValues,
    writers: BTreeMap<FieldId, FieldWrite>,
}

/// State and pipeline shared with the remote-edit handler and the
/// registry's control surface
struct SessionCore {
    schema: Arc<FormSchema>,
    config: SessionConfig,
    diagnostics: Diagnostics,
    state: Mutex<SessionState>,
    observers: Mutex<BTreeMap<ObserverId, Observer>>,
    next_observer: AtomicU64,
}

impl SessionCore {
    fn form_id(&self) -> &FormId {
        self.schema.form_id()
    }

    fn destroyed(&self) -> FormError {
        FormError::Destroyed {
            form_id: self.form_id().clone(),
        }
    }

    /// Lock the state, failing once the session is destroyed
    fn live(&self) -> FormResult<MutexGuard<'_, SessionState>> {
        let state = self.state.lock();
        if state.lifecycle == Lifecycle::Destroyed {
            return Err(self.destroyed());
        }
        Ok(state)
    }

    fn writable(&self) -> FormResult<MutexGuard<'_, SessionState>> {
        let state = self.live()?;
        if self.config.read_only {
            return Err(FormError::ReadOnly(self.form_id().clone()));
        }
        Ok(state)
    }

    fn snapshot(&self, state: &SessionState) -> FormState {
        FormState {
            form_id: self.form_id().clone(),
            values: state.values.clone(),
            errors: state.errors.clone(),
            is_dirty: state.lifecycle == Lifecycle::Dirty,
            active_tab: state.active_tab.clone(),
        }
    }

    fn revalidate(&self, state: &mut SessionState) {
        let visibility = Visibility::resolve(&self.schema, &state.values, &self.diagnostics);
        state.errors = validate(&self.schema, &state.values, &visibility).errors;
    }

    /// Recompute derived fields, merge them, then re-validate
    fn settle(&self, state: &mut SessionState, trigger: Option<&FieldId>) {
        let updates = recompute(&self.schema, &state.values, trigger, &self.diagnostics);
        state.values.extend(updates);
        self.revalidate(state);
    }

    /// Notify observers with no session lock held
    fn notify(&self, cause: ChangeCause, state: FormState) {
        let observers: Vec<Observer> = self.observers.lock().values().cloned().collect();
        if observers.is_empty() {
            return;
        }
        let event = SessionEvent { cause, state };
        for observer in observers {
            observer(&event);
        }
    }

    fn write_field(
        &self,
        mut state: MutexGuard<'_, SessionState>,
        field_id: FieldId,
        value: FieldValue,
        writer: FieldWrite,
        cause: ChangeCause,
    ) {
        state.values.insert(field_id.clone(), value);
        state.errors.remove(&field_id);
        state.lifecycle = Lifecycle::Dirty;
        self.settle(&mut state, Some(&field_id));
        state.writers.insert(field_id, writer);

        let snapshot = self.snapshot(&state);
        drop(state);
        self.notify(cause, snapshot);
    }

    fn apply_remote(&self, edit: &RemoteEdit) -> FormResult<bool> {
        let state = self.live()?;

        let reason = if &edit.form_id != self.form_id() {
            Some(format!("edit is for form {}", edit.form_id))
        } else if !self.schema.contains(edit.field_id.as_str()) {
            Some("field is not declared".to_string())
        } else {
            None
        };
        if let Some(reason) = reason {
            drop(state);
            self.diagnostics.report(Diagnostic::DroppedRemoteEdit {
                form_id: self.form_id().clone(),
                field_id: edit.field_id.clone(),
                origin: edit.origin_user_id.clone(),
                reason,
            });
            return Ok(false);
        }

        tracing::debug!(
            form = %edit.form_id,
            field = %edit.field_id,
            origin = %edit.origin_user_id,
            "applying remote edit"
        );
        self.write_field(
            state,
            edit.field_id.clone(),
            edit.value.clone(),
            FieldWrite {
                user_id: edit.origin_user_id.clone(),
                timestamp: edit.timestamp,
            },
            ChangeCause::RemoteEdit {
                field_id: edit.field_id.clone(),
                origin: edit.origin_user_id.clone(),
            },
        );
        Ok(true)
    }

    /// Overlay several values at once, recomputing and validating once
    fn overlay(&self, partial: FieldValues, cause: ChangeCause) -> FormResult<()> {
        let mut state = self.writable()?;
        let stamp = now_millis();
        for (id, value) in partial {
            if !self.schema.contains(id.as_str()) {
                tracing::warn!(form = %self.form_id(), field = %id, "ignoring undeclared field");
                continue;
            }
            state.writers.insert(
                id.clone(),
                FieldWrite {
                    user_id: self.config.user_id.clone(),
                    timestamp: stamp,
                },
            );
            state.values.insert(id, value);
        }
        state.lifecycle = Lifecycle::Dirty;
        self.settle(&mut state, None);

        let snapshot = self.snapshot(&state);
        drop(state);
        self.notify(cause, snapshot);
        Ok(())
    }

    fn validate_all(&self) -> FormResult<bool> {
        let mut state = self.live()?;
        self.revalidate(&mut state);
        let valid = state.errors.is_empty();

        let snapshot = self.snapshot(&state);
        drop(state);
        self.notify(ChangeCause::Validated, snapshot);
        Ok(valid)
    }

    fn reset(&self) -> FormResult<()> {
        let mut state = self.live()?;
        state.values = state.baseline.clone();
        state.errors.clear();
        state.writers.clear();
        state.lifecycle = Lifecycle::Ready;

        let snapshot = self.snapshot(&state);
        drop(state);
        self.notify(ChangeCause::Reset, snapshot);
        Ok(())
    }

    fn values(&self) -> FormResult<FieldValues> {
        Ok(self.live()?.values.clone())
    }
}

/// Registry view of a session; holds no strong reference to it
struct SessionControl {
    form_id: FormId,
    core: Weak<SessionCore>,
}

impl SessionControl {
    fn core(&self) -> FormResult<Arc<SessionCore>> {
        self.core.upgrade().ok_or_else(|| FormError::Destroyed {
            form_id: self.form_id.clone(),
        })
    }
}

impl FormControl for SessionControl {
    fn get_values(&self) -> FormResult<FieldValues> {
        self.core()?.values()
    }

    fn set_values(&self, values: FieldValues) -> FormResult<()> {
        self.core()?.overlay(values, ChangeCause::ValuesSet)
    }

    fn validate(&self) -> FormResult<bool> {
        self.core()?.validate_all()
    }

    fn reset(&self) -> FormResult<()> {
        self.core()?.reset()
    }
}

/// A live form
pub struct FormSession {
    core: Arc<SessionCore>,
    registration: Option<(FormRegistry, RegistrationId)>,
    synchronizer: Option<Synchronizer>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl FormSession {
    /// Open a session: defaults, overlaid with `initial`, first tab
    /// selected, registered and subscribed
    ///
    /// A collaborative session attributes local edits to the synchronizer's
    /// user, whatever `config.user_id` says.
    pub fn new(
        schema: Arc<FormSchema>,
        initial: FieldValues,
        mut config: SessionConfig,
        services: SessionServices,
    ) -> FormSession {
        let mut values: FieldValues = schema
            .fields()
            .iter()
            .map(|f| (f.id.clone(), f.initial_value()))
            .collect();
        for (id, value) in initial {
            if schema.contains(id.as_str()) {
                values.insert(id, value);
            } else {
                tracing::warn!(form = %schema.form_id(), field = %id, "ignoring undeclared initial value");
            }
        }

        let active_tab = schema.config().layout.first_tab().cloned();
        let form_id = schema.form_id().clone();
        let SessionServices {
            registry,
            synchronizer,
            diagnostics,
        } = services;

        let synchronizer = synchronizer.filter(|_| config.collaborative);
        if let Some(sync) = &synchronizer {
            if sync.user_id() != &config.user_id {
                tracing::warn!(
                    form = %form_id,
                    session_user = %config.user_id,
                    sync_user = %sync.user_id(),
                    "session user differs from synchronizer user, using the synchronizer's"
                );
                config.user_id = sync.user_id().clone();
            }
        }

        let core = Arc::new(SessionCore {
            schema,
            config,
            diagnostics,
            state: Mutex::new(SessionState {
                lifecycle: Lifecycle::Ready,
                baseline: values.clone(),
                values,
                errors: FieldErrors::new(),
                active_tab,
                writers: BTreeMap::new(),
            }),
            observers: Mutex::new(BTreeMap::new()),
            next_observer: AtomicU64::new(1),
        });

        let registration = registry.map(|registry| {
            let control = Arc::new(SessionControl {
                form_id: form_id.clone(),
                core: Arc::downgrade(&core),
            });
            let id = registry.register(form_id.clone(), control);
            (registry, id)
        });

        let subscription = synchronizer.as_ref().map(|sync| {
            let weak = Arc::downgrade(&core);
            sync.subscribe(
                form_id.clone(),
                Arc::new(move |edit: &RemoteEdit| {
                    let Some(core) = weak.upgrade() else {
                        return;
                    };
                    if let Err(e) = core.apply_remote(edit) {
                        tracing::debug!(form = %edit.form_id, error = %e, "remote edit not applied");
                    }
                }),
            )
        });

        tracing::debug!(form = %form_id, user = %core.config.user_id, "session opened");

        FormSession {
            core,
            registration,
            synchronizer,
            subscription: Mutex::new(subscription),
        }
    }

    /// Open a standalone session with no registry or collaboration
    pub fn standalone(schema: Arc<FormSchema>, initial: FieldValues) -> FormSession {
        Self::new(
            schema,
            initial,
            SessionConfig::default(),
            SessionServices::default(),
        )
    }

    pub fn form_id(&self) -> &FormId {
        self.core.form_id()
    }

    pub fn schema(&self) -> &Arc<FormSchema> {
        &self.core.schema
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.core.state.lock().lifecycle
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle() == Lifecycle::Destroyed
    }

    /// Control surface as registered with the form registry
    pub fn control(&self) -> Arc<dyn FormControl> {
        Arc::new(SessionControl {
            form_id: self.form_id().clone(),
            core: Arc::downgrade(&self.core),
        })
    }

    // ---- edits ----

    /// Write a field locally and publish the raw edit
    pub fn set_field(
        &self,
        field_id: impl Into<FieldId>,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        let field_id = field_id.into();
        let value = value.into();
        let state = self.core.writable()?;
        if !self.core.schema.contains(field_id.as_str()) {
            return Err(FormError::UnknownField(field_id));
        }

        let writer = FieldWrite {
            user_id: self.core.config.user_id.clone(),
            timestamp: now_millis(),
        };
        let timestamp = writer.timestamp;
        self.core.write_field(
            state,
            field_id.clone(),
            value.clone(),
            writer,
            ChangeCause::LocalEdit(field_id.clone()),
        );

        if let Some(sync) = &self.synchronizer {
            let edit = RemoteEdit::new(
                self.form_id().clone(),
                field_id,
                value,
                self.core.config.user_id.clone(),
            )
            .with_timestamp(timestamp);
            // The local write stands even if the channel is down
            if let Err(e) = sync.publish(edit) {
                tracing::warn!(form = %self.form_id(), error = %e, "failed to publish edit");
            }
        }
        Ok(())
    }

    /// Apply an edit received from a collaborator
    ///
    /// Returns `Ok(false)` when the edit was dropped: wrong form or an
    /// undeclared field.
    pub fn apply_remote_edit(&self, edit: &RemoteEdit) -> FormResult<bool> {
        self.core.apply_remote(edit)
    }

    /// Lay a template over the current values
    ///
    /// Returns `Ok(false)` and changes nothing when the template is unknown.
    /// Template values are not published.
    pub fn apply_template(&self, template_id: &str) -> FormResult<bool> {
        let mut state = self.core.writable()?;
        let Some(merged) = template::apply_template(&self.core.schema, template_id, &state.values)
        else {
            tracing::debug!(form = %self.form_id(), template = template_id, "unknown template");
            return Ok(false);
        };

        if let Some(template) = self.core.schema.template(template_id) {
            let stamp = now_millis();
            for id in template.field_values.keys() {
                state.writers.insert(
                    id.clone(),
                    FieldWrite {
                        user_id: self.core.config.user_id.clone(),
                        timestamp: stamp,
                    },
                );
            }
        }
        state.values = merged;
        state.lifecycle = Lifecycle::Dirty;
        self.core.settle(&mut state, None);

        let snapshot = self.core.snapshot(&state);
        drop(state);
        self.core
            .notify(ChangeCause::Template(template_id.to_string()), snapshot);
        Ok(true)
    }

    /// Overlay a partial mapping of values; undeclared ids are ignored
    pub fn set_values(&self, values: FieldValues) -> FormResult<()> {
        self.core.overlay(values, ChangeCause::ValuesSet)
    }

    // ---- validation and submission ----

    /// Validate every visible field, storing the errors
    pub fn validate_all(&self) -> FormResult<bool> {
        self.core.validate_all()
    }

    /// Validate, then hand the values to `on_submit`
    ///
    /// On failure the callback is not invoked, values and the dirty flag
    /// are left as they were, and the error mapping is returned.
    pub fn submit<F>(&self, on_submit: F) -> FormResult<()>
    where
        F: FnOnce(&FieldValues),
    {
        let mut state = self.core.live()?;
        self.core.revalidate(&mut state);
        if !state.errors.is_empty() {
            let errors = state.errors.clone();
            let snapshot = self.core.snapshot(&state);
            drop(state);
            self.core.notify(ChangeCause::Validated, snapshot);
            return Err(FormError::ValidationFailed(errors));
        }

        let values = state.values.clone();
        state.lifecycle = Lifecycle::Ready;
        let snapshot = self.core.snapshot(&state);
        drop(state);

        on_submit(&values);
        self.core.notify(ChangeCause::Submitted, snapshot);
        Ok(())
    }

    /// Restore construction-time values, clearing errors and the dirty flag
    pub fn reset(&self) -> FormResult<()> {
        self.core.reset()
    }

    // ---- layout ----

    pub fn select_tab(&self, tab_id: impl Into<TabId>) -> FormResult<()> {
        let tab_id = tab_id.into();
        let mut state = self.core.live()?;
        if self.core.schema.config().layout.tab(tab_id.as_str()).is_none() {
            return Err(FormError::UnknownTab(tab_id));
        }
        state.active_tab = Some(tab_id.clone());

        let snapshot = self.core.snapshot(&state);
        drop(state);
        self.core.notify(ChangeCause::TabSelected(tab_id), snapshot);
        Ok(())
    }

    pub fn active_tab(&self) -> FormResult<Option<TabId>> {
        Ok(self.core.live()?.active_tab.clone())
    }

    /// Visible fields of a tab, section by section
    ///
    /// `None` means the active tab for a tabbed layout, or every section
    /// for a single layout. A single layout without sections yields one
    /// section holding every field.
    pub fn section_view(&self, tab_id: Option<&str>) -> FormResult<Vec<SectionView>> {
        let state = self.core.live()?;
        let schema = &self.core.schema;
        let layout = &schema.config().layout;

        let sections: Vec<Section> = match (layout, tab_id) {
            (Layout::Tabbed { .. }, requested) => {
                let Some(id) = requested
                    .map(str::to_string)
                    .or_else(|| state.active_tab.as_ref().map(|t| t.to_string()))
                else {
                    return Ok(Vec::new());
                };
                match layout.tab(&id) {
                    Some(tab) => tab.sections.clone(),
                    None => return Err(FormError::UnknownTab(TabId::new(id))),
                }
            }
            (Layout::Single { .. }, Some(id)) => {
                return Err(FormError::UnknownTab(TabId::new(id)));
            }
            (Layout::Single { sections }, None) if sections.is_empty() => vec![Section {
                id: schema.form_id().to_string(),
                title: schema.config().form_name.clone(),
                fields: schema.fields().iter().map(|f| f.id.clone()).collect(),
            }],
            (Layout::Single { sections }, None) => sections.clone(),
        };

        let visibility = Visibility::resolve(schema, &state.values, &self.core.diagnostics);
        let presence = self.presence_snapshot();

        let views = sections
            .into_iter()
            .map(|section| SectionView {
                fields: section
                    .fields
                    .iter()
                    .filter(|id| visibility.is_visible(id.as_str()))
                    .filter_map(|id| schema.field(id.as_str()))
                    .map(|field| FieldView {
                        id: field.id.clone(),
                        label: field.label.clone(),
                        field_type: field.field_type,
                        required: field.required,
                        computed: field.computed,
                        value: state.values.get(&field.id).cloned().unwrap_or_default(),
                        error: state.errors.get(&field.id).cloned(),
                        editors: presence
                            .get(&field.id)
                            .map(|users| users.iter().cloned().collect())
                            .unwrap_or_default(),
                    })
                    .collect(),
                id: section.id,
                title: section.title,
            })
            .collect();
        Ok(views)
    }

    // ---- presence ----

    /// Tell collaborators this user is editing `field_id`
    pub fn focus_field(&self, field_id: impl Into<FieldId>) -> FormResult<()> {
        let field_id = self.known_field(field_id.into())?;
        match &self.synchronizer {
            Some(sync) => sync.focus(self.form_id(), &field_id),
            None => Ok(()),
        }
    }

    pub fn blur_field(&self, field_id: impl Into<FieldId>) -> FormResult<()> {
        let field_id = self.known_field(field_id.into())?;
        match &self.synchronizer {
            Some(sync) => sync.blur(self.form_id(), &field_id),
            None => Ok(()),
        }
    }

    /// Who is focused on which field of this form
    pub fn presence(&self) -> FormResult<EditingPresence> {
        self.core.live()?;
        Ok(self.presence_snapshot())
    }

    fn presence_snapshot(&self) -> EditingPresence {
        self.synchronizer
            .as_ref()
            .map(|sync| sync.presence(self.form_id()))
            .unwrap_or_default()
    }

    fn known_field(&self, field_id: FieldId) -> FormResult<FieldId> {
        self.core.live()?;
        if !self.core.schema.contains(field_id.as_str()) {
            return Err(FormError::UnknownField(field_id));
        }
        Ok(field_id)
    }

    // ---- observers ----

    /// Register an observer, called after every state change
    pub fn on_change(&self, observer: Observer) -> FormResult<ObserverId> {
        self.core.live()?;
        let id = ObserverId(self.core.next_observer.fetch_add(1, Ordering::Relaxed));
        self.core.observers.lock().insert(id, observer);
        Ok(id)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.core.observers.lock().remove(&id).is_some()
    }

    // ---- reads ----

    pub fn state(&self) -> FormResult<FormState> {
        let state = self.core.live()?;
        Ok(self.core.snapshot(&state))
    }

    pub fn values(&self) -> FormResult<FieldValues> {
        self.core.values()
    }

    pub fn value(&self, field_id: &str) -> FormResult<FieldValue> {
        let state = self.core.live()?;
        state
            .values
            .get(field_id)
            .cloned()
            .ok_or_else(|| FormError::UnknownField(FieldId::new(field_id)))
    }

    pub fn errors(&self) -> FormResult<FieldErrors> {
        Ok(self.core.live()?.errors.clone())
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        Ok(self.core.live()?.lifecycle == Lifecycle::Dirty)
    }

    /// Who last wrote a field, and when
    pub fn last_writer(&self, field_id: &str) -> FormResult<Option<FieldWrite>> {
        Ok(self.core.live()?.writers.get(field_id).cloned())
    }

    // ---- teardown ----

    /// Unregister, unsubscribe and leave presence
    ///
    /// Once this returns no remote edit or observer callback reaches the
    /// session. Every later operation fails with `FormError::Destroyed`.
    pub fn destroy(&self) -> FormResult<()> {
        {
            let mut state = self.core.live()?;
            state.lifecycle = Lifecycle::Destroyed;
        }

        if let Some(sync) = &self.synchronizer {
            if let Some(id) = self.subscription.lock().take() {
                sync.unsubscribe(id);
            }
            if let Err(e) = sync.leave(self.form_id()) {
                tracing::warn!(form = %self.form_id(), error = %e, "failed to announce leave");
            }
        }
        if let Some((registry, id)) = &self.registration {
            registry.unregister_if(self.form_id(), *id);
        }
        self.core.observers.lock().clear();

        tracing::debug!(form = %self.form_id(), "session destroyed");
        Ok(())
    }
}

impl Drop for FormSession {
    fn drop(&mut self) {
        if !self.is_destroyed() {
            let _ = self.destroy();
        }
    }
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("form_id", self.form_id())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
