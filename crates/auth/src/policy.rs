//! Session validity policy.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::Session;

/// How sessions are carried and how long they stay valid.
///
/// The cookie lifetime is what the browser is told; `max_age` is enforced on
/// the server at lookup time. Without `max_age` a session lives until logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    pub cookie_name: String,
    pub cookie_lifetime: Duration,
    pub max_age: Option<Duration>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            cookie_name: "formwork-session".to_string(),
            cookie_lifetime: Duration::days(7),
            max_age: None,
        }
    }
}

impl SessionPolicy {
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    #[error("session has expired")]
    Expired,

    #[error("session created in the future")]
    NotYetValid,
}

/// Deterministically check a stored session against the policy.
pub fn validate_session(
    session: &Session,
    policy: &SessionPolicy,
    now: DateTime<Utc>,
) -> Result<(), SessionValidationError> {
    let age = session.age(now);
    if age < Duration::zero() {
        return Err(SessionValidationError::NotYetValid);
    }
    match policy.max_age {
        Some(max) if age > max => Err(SessionValidationError::Expired),
        _ => Ok(()),
    }
}
