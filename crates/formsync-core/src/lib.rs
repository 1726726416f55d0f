//! formsync Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every formsync component:
//! - Identifiers (FormId, FieldId, UserId, TabId, PeerId)
//! - Field values and value maps
//! - The declarative schema document (FormConfiguration)
//! - Collaboration messages (RemoteEdit, presence signals)
//! - The error taxonomy

pub mod id;
pub mod value;
pub mod schema;
pub mod edit;
pub mod error;

pub use id::*;
pub use value::*;
pub use schema::*;
pub use edit::*;
pub use error::*;
