//! `formwork-auth`: session and authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP frameworks and storage:
//! it only knows about sessions, their validity, the cookie that carries them,
//! and who may see which job.

pub mod authorize;
pub mod cookie;
pub mod policy;
pub mod session;

pub use authorize::{authorize_job_access, AuthzError};
pub use cookie::{expired_cookie, session_cookie, session_id_from_cookie_header};
pub use policy::{SessionPolicy, SessionValidationError, validate_session};
pub use session::Session;
