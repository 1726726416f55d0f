//! formsync Runtime - Workspace orchestration
//!
//! Wires the engine together for one user:
//! - Workspace configuration
//! - Tracing subscriber set-up
//! - Schema catalogue, form registry and collaboration synchronizer
//! - The background receive loop on tokio

pub mod config;
pub mod telemetry;
pub mod workspace;

pub use config::*;
pub use telemetry::*;
pub use workspace::*;
