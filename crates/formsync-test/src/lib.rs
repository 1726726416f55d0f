//! formsync Test Harness - Collaboration simulation and engine validation
//!
//! This crate provides:
//! - Schema fixtures
//! - A multi-collaborator harness on one in-memory channel
//! - Scripted scenarios
//! - A live cluster of workspaces with running receive loops
//! - Invariant checks shared by the property tests

pub mod fixtures;
pub mod harness;
pub mod scenario;
pub mod invariants;
pub mod live;

#[cfg(test)]
mod properties;

pub use fixtures::*;
pub use harness::*;
pub use scenario::*;
pub use invariants::*;
pub use live::*;
