//! Server-side session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formwork_core::{SessionId, UserId};

/// Links a cookie value to a user and the upstream access token acting for
/// that user.
///
/// # Invariants
/// - `id` is globally unique (the store rejects duplicates).
/// - `user_id` and `token` never change; logging in again creates a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// Upstream access token of the user.
    pub token: String,
    pub created: DateTime<Utc>,
}

impl Session {
    /// New session with a freshly generated id.
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self::issued_at(user_id, token, Utc::now())
    }

    pub fn issued_at(user_id: UserId, token: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            user_id,
            token: token.into(),
            created,
        }
    }

    /// Time elapsed since the session was created.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sessions_get_distinct_ids() {
        let a = Session::new(UserId::new(7), "tok");
        let b = Session::new(UserId::new(7), "tok");
        assert_ne!(a.id, b.id);
        assert_eq!(a.user_id, b.user_id);
    }

    #[test]
    fn age_is_measured_from_creation() {
        let created = Utc::now() - chrono::Duration::hours(3);
        let s = Session::issued_at(UserId::new(1), "tok", created);
        let age = s.age(Utc::now());
        assert!(age >= chrono::Duration::hours(3));
    }
}
