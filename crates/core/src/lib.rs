//! `formwork-core`: domain building blocks shared by every layer.
//!
//! This crate holds **pure** types only: identifiers, the web form model and
//! the submitted value map. Storage, HTTP and upstream concerns live elsewhere.

pub mod error;
pub mod form;
pub mod id;
pub mod values;

pub use error::{DomainError, DomainResult};
pub use form::{Element, ElementType, Form, Page};
pub use id::{JobId, SessionId, UserId};
pub use values::ValueMap;
