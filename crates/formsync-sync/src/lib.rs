//! formsync Sync - Collaboration synchronizer
//!
//! This crate bridges form sessions to a shared channel:
//! - Channel abstraction and an in-memory broadcast channel
//! - Edit publication and per-form subscriptions
//! - Editing presence (who is focused on which field)
//! - Async receive loop

pub mod channel;
pub mod presence;
pub mod synchronizer;

pub use channel::*;
pub use presence::*;
pub use synchronizer::*;
