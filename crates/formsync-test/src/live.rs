//! Live cluster on tokio
//!
//! Workspaces with running receive loops on one in-memory channel. Unlike
//! `CollabHarness`, delivery is asynchronous, so tests wait for
//! convergence with a deadline instead of settling explicitly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use formsync_core::{FieldValues, FormError, FormId, FormResult, UserId};
use formsync_runtime::{FormWorkspace, WorkspaceConfig};
use formsync_state::{FormSchema, FormSession};
use formsync_sync::{CollabChannel, InMemoryChannel};

/// Polling interval while waiting for convergence
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Live cluster configuration
#[derive(Clone, Debug)]
pub struct LiveConfig {
    pub users: Vec<UserId>,
    /// How long `wait_converged` waits before giving up
    pub converge_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            users: vec![UserId::new("alice"), UserId::new("bob")],
            converge_timeout: Duration::from_secs(2),
        }
    }
}

impl LiveConfig {
    pub fn with_users<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        LiveConfig {
            users: users.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

pub struct LiveCluster {
    config: LiveConfig,
    workspaces: BTreeMap<UserId, FormWorkspace>,
    sessions: BTreeMap<(UserId, FormId), FormSession>,
}

impl LiveCluster {
    /// Start one workspace per user; must run inside a tokio runtime
    pub fn start(config: LiveConfig) -> FormResult<Self> {
        let channel: Arc<dyn CollabChannel> = Arc::new(InMemoryChannel::new());
        let mut workspaces = BTreeMap::new();
        for user in &config.users {
            let workspace =
                FormWorkspace::new(WorkspaceConfig::for_user(user.clone()), Arc::clone(&channel));
            if !workspace.start() {
                return Err(FormError::Config(format!(
                    "receive loop for {} did not start",
                    user
                )));
            }
            workspaces.insert(user.clone(), workspace);
        }
        Ok(LiveCluster {
            config,
            workspaces,
            sessions: BTreeMap::new(),
        })
    }

    pub fn workspace(&self, user: &str) -> Option<&FormWorkspace> {
        self.workspaces.get(user)
    }

    /// Open `schema` in every workspace
    pub fn open_all(&mut self, schema: Arc<FormSchema>, initial: FieldValues) {
        let form_id = schema.form_id().clone();
        for (user, workspace) in &self.workspaces {
            let session = workspace.open_schema(Arc::clone(&schema), initial.clone());
            self.sessions.insert((user.clone(), form_id.clone()), session);
        }
    }

    pub fn session(&self, user: &str, form_id: &FormId) -> FormResult<&FormSession> {
        self.sessions
            .get(&(UserId::new(user), form_id.clone()))
            .ok_or_else(|| FormError::UnknownForm(form_id.clone()))
    }

    fn snapshots(&self, form_id: &FormId) -> Vec<FieldValues> {
        self.sessions
            .iter()
            .filter(|((_, form), _)| form == form_id)
            .filter_map(|(_, session)| session.values().ok())
            .collect()
    }

    pub fn converged(&self, form_id: &FormId) -> bool {
        let snapshots = self.snapshots(form_id);
        snapshots.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Wait until every session of `form_id` holds the same values
    ///
    /// Returns `false` on timeout.
    pub async fn wait_converged(&self, form_id: &FormId) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.converge_timeout;
        loop {
            if self.converged(form_id) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(form = %form_id, "cluster did not converge");
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop every receive loop and destroy every session
    pub fn shutdown(&mut self) {
        for workspace in self.workspaces.values() {
            workspace.shutdown();
        }
        for (_, session) in std::mem::take(&mut self.sessions) {
            let _ = session.destroy();
        }
    }
}

impl Drop for LiveCluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::tranche_schema;
    use formsync_core::FieldValue;

    #[tokio::test]
    async fn test_live_edits_converge() {
        let mut cluster = LiveCluster::start(LiveConfig::with_users(["alice", "bob", "carol"])).unwrap();
        let schema = tranche_schema().unwrap();
        let form = schema.form_id().clone();
        cluster.open_all(schema, FieldValues::new());

        cluster.session("alice", &form).unwrap().set_field("name", "Live").unwrap();
        assert!(cluster.wait_converged(&form).await);
        cluster.session("bob", &form).unwrap().set_field("amount", "300").unwrap();
        assert!(cluster.wait_converged(&form).await);

        let carol = cluster.session("carol", &form).unwrap();
        assert_eq!(carol.value("name").unwrap(), FieldValue::from("Live"));
        assert_eq!(carol.value("rate").unwrap(), FieldValue::Number(3.0));
        assert_eq!(cluster.workspace("carol").unwrap().sync_stats().published, 0);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let result = LiveCluster::start(LiveConfig::default());
        assert!(matches!(result, Err(FormError::Config(_))));
    }
}
