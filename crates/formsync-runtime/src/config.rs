//! Workspace configuration
//!
//! Loaded from JSON; every key is optional.
//!
//! ```json
//! {
//!   "userId": "alice",
//!   "readOnly": false,
//!   "collaborative": true,
//!   "telemetry": { "level": "formsync=debug", "json": true }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use formsync_core::{FormError, FormResult, UserId};
use formsync_state::SessionConfig;
use formsync_sync::SyncConfig;

/// Log output settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// Default filter directive, used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Everything a workspace needs to know about its user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub user_id: UserId,
    /// Open every session read-only
    pub read_only: bool,
    /// Publish and receive edits
    pub collaborative: bool,
    /// Hand this user's own frames back to its sessions
    pub deliver_own: bool,
    pub telemetry: TelemetryConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            user_id: UserId::new("anonymous"),
            read_only: false,
            collaborative: true,
            deliver_own: false,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        WorkspaceConfig {
            user_id: user_id.into(),
            ..WorkspaceConfig::default()
        }
    }

    pub fn from_json(json: &str) -> FormResult<Self> {
        serde_json::from_str(json).map_err(|e| FormError::Config(e.to_string()))
    }

    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> FormResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| FormError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::for_user(self.user_id.clone())
            .with_read_only(self.read_only)
            .with_collaborative(self.collaborative)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            user_id: self.user_id.clone(),
            deliver_own: self.deliver_own,
        }
    }
}
