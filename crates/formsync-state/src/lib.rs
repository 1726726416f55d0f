//! formsync State - Form evaluation engine
//!
//! This crate implements the form evaluation pipeline:
//! - Schema checking (every reference resolves before a session exists)
//! - Visibility resolution
//! - Validation
//! - Computed field evaluation
//! - Template application
//! - Live form sessions and the process-wide form registry
//!
//! The resolver, validator, evaluator and template applicator are pure
//! functions; the session is the only owner of mutable form state.

pub mod schema;
pub mod diagnostics;
pub mod visibility;
pub mod validation;
pub mod computed;
pub mod template;
pub mod registry;
pub mod session;

pub use schema::*;
pub use diagnostics::*;
pub use visibility::*;
pub use validation::*;
pub use computed::*;
pub use template::*;
pub use registry::*;
pub use session::*;
