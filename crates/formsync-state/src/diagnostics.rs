//! Non-fatal diagnostics
//!
//! Formula failures, dependencies that cannot be resolved and dropped
//! remote edits never interrupt a session. They are logged and, when a
//! hook is installed, handed to the host application.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use formsync_core::{FieldId, FormId, UserId};
use formsync_formula::EvalError;

/// Something went wrong without stopping the form
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A computed field kept its previous value because its formula failed
    FormulaFailed {
        form_id: FormId,
        field_id: FieldId,
        formula: String,
        error: EvalError,
    },
    /// A dependency names a field that has no value; the field is hidden
    DanglingDependency {
        form_id: FormId,
        field_id: FieldId,
        depends_on: FieldId,
    },
    /// A remote edit could not be applied
    DroppedRemoteEdit {
        form_id: FormId,
        field_id: FieldId,
        origin: UserId,
        reason: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::FormulaFailed {
                form_id,
                field_id,
                formula,
                error,
            } => write!(
                f,
                "{}: formula {} for {} failed: {}",
                form_id, formula, field_id, error
            ),
            Diagnostic::DanglingDependency {
                form_id,
                field_id,
                depends_on,
            } => write!(
                f,
                "{}: {} depends on {} which has no value",
                form_id, field_id, depends_on
            ),
            Diagnostic::DroppedRemoteEdit {
                form_id,
                field_id,
                origin,
                reason,
            } => write!(
                f,
                "{}: dropped edit of {} from {}: {}",
                form_id, field_id, origin, reason
            ),
        }
    }
}

pub type DiagnosticHook = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Diagnostics sink shared by a session and the pure pipeline stages
#[derive(Clone, Default)]
pub struct Diagnostics {
    hook: Option<DiagnosticHook>,
}

impl Diagnostics {
    /// Log only
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and forward every diagnostic to `hook`
    pub fn with_hook(hook: DiagnosticHook) -> Self {
        Diagnostics { hook: Some(hook) }
    }

    /// Log and collect into a shared buffer
    pub fn collecting() -> (Self, Arc<Mutex<Vec<Diagnostic>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let diagnostics = Self::with_hook(Arc::new(move |d: &Diagnostic| {
            sink.lock().push(d.clone());
        }));
        (diagnostics, buffer)
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::FormulaFailed { .. } => tracing::warn!(%diagnostic, "formula failed"),
            Diagnostic::DanglingDependency { .. } => {
                tracing::warn!(%diagnostic, "unresolved dependency")
            }
            Diagnostic::DroppedRemoteEdit { .. } => {
                tracing::warn!(%diagnostic, "remote edit dropped")
            }
        }
        if let Some(hook) = &self.hook {
            hook(&diagnostic);
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
