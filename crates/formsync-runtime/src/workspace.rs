//! Form workspace
//!
//! One user's view of the engine: a catalogue of compiled schemas, the
//! form registry, and a synchronizer on the shared collaboration channel.
//! Sessions opened here are registered and, unless the workspace is
//! configured otherwise, collaborative. A non-collaborative workspace never
//! subscribes to the channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use formsync_core::{FieldValues, FormConfiguration, FormError, FormId, FormResult};
use formsync_state::{
    Diagnostics, FormRegistry, FormSchema, FormSession, SessionServices,
};
use formsync_sync::{CollabChannel, SyncStats, Synchronizer};

use crate::config::WorkspaceConfig;

pub struct FormWorkspace {
    config: WorkspaceConfig,
    schemas: RwLock<BTreeMap<FormId, Arc<FormSchema>>>,
    registry: FormRegistry,
    synchronizer: Option<Synchronizer>,
    diagnostics: Diagnostics,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl FormWorkspace {
    /// Create a workspace attached to a collaboration channel
    pub fn new(config: WorkspaceConfig, channel: Arc<dyn CollabChannel>) -> Self {
        let synchronizer = config
            .collaborative
            .then(|| Synchronizer::new(channel, config.sync_config()));
        tracing::info!(
            user = %config.user_id,
            collaborative = config.collaborative,
            "workspace created"
        );
        FormWorkspace {
            config,
            schemas: RwLock::new(BTreeMap::new()),
            registry: FormRegistry::new(),
            synchronizer,
            diagnostics: Diagnostics::new(),
            receiver: Mutex::new(None),
        }
    }

    /// Route diagnostics of sessions opened from now on to `diagnostics`
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn registry(&self) -> &FormRegistry {
        &self.registry
    }

    /// The channel attachment, absent when the workspace is not collaborative
    pub fn synchronizer(&self) -> Option<&Synchronizer> {
        self.synchronizer.as_ref()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.synchronizer
            .as_ref()
            .map(Synchronizer::stats)
            .unwrap_or_default()
    }

    // ---- schemas ----

    /// Compile and catalogue a schema, replacing any earlier one for that form
    pub fn add_schema(&self, config: FormConfiguration) -> FormResult<Arc<FormSchema>> {
        let schema = FormSchema::load(config)?;
        self.schemas
            .write()
            .insert(schema.form_id().clone(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn add_schema_json(&self, json: &str) -> FormResult<Arc<FormSchema>> {
        self.add_schema(FormConfiguration::from_json(json)?)
    }

    pub fn schema(&self, form_id: &FormId) -> Option<Arc<FormSchema>> {
        self.schemas.read().get(form_id).cloned()
    }

    pub fn form_ids(&self) -> Vec<FormId> {
        self.schemas.read().keys().cloned().collect()
    }

    // ---- sessions ----

    /// Open a session on a catalogued form
    pub fn open(&self, form_id: &FormId, initial: FieldValues) -> FormResult<FormSession> {
        let schema = self
            .schema(form_id)
            .ok_or_else(|| FormError::UnknownForm(form_id.clone()))?;
        Ok(self.open_schema(schema, initial))
    }

    /// Open a session on an already compiled schema
    pub fn open_schema(&self, schema: Arc<FormSchema>, initial: FieldValues) -> FormSession {
        let mut services = SessionServices::new()
            .with_registry(self.registry.clone())
            .with_diagnostics(self.diagnostics.clone());
        if let Some(sync) = &self.synchronizer {
            services = services.with_synchronizer(sync.clone());
        }
        FormSession::new(schema, initial, self.config.session_config(), services)
    }

    /// Validate every open form
    pub fn validate_all(&self) -> BTreeMap<FormId, FormResult<bool>> {
        self.registry.validate_all()
    }

    pub fn reset_all(&self) -> usize {
        self.registry.reset_all()
    }

    /// Current values of every open form
    pub fn collect_values(&self) -> BTreeMap<FormId, FieldValues> {
        self.registry.collect_values()
    }

    // ---- collaboration ----

    /// Start the background receive loop on the current tokio runtime
    ///
    /// Returns `false` if it is already running, there is no runtime, or
    /// the workspace is not collaborative.
    pub fn start(&self) -> bool {
        let Some(sync) = &self.synchronizer else {
            return false;
        };
        let mut receiver = self.receiver.lock();
        if receiver.is_some() {
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(user = %self.config.user_id, "no tokio runtime, receive loop not started");
            return false;
        }
        match sync.spawn() {
            Some(handle) => {
                tracing::debug!(user = %self.config.user_id, "receive loop started");
                *receiver = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Apply everything waiting on the channel, for callers without a
    /// running receive loop
    pub fn pump(&self) -> usize {
        self.synchronizer.as_ref().map_or(0, Synchronizer::pump)
    }

    /// Stop the receive loop
    pub fn shutdown(&self) {
        if let Some(handle) = self.receiver.lock().take() {
            handle.abort();
            tracing::debug!(user = %self.config.user_id, "receive loop stopped");
        }
    }
}

impl Drop for FormWorkspace {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FormWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormWorkspace")
            .field("user_id", &self.config.user_id)
            .field("forms", &self.form_ids())
            .finish()
    }
}
