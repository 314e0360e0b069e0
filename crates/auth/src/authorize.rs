use thiserror::Error;

use formwork_core::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("job belongs to another user")]
    NotOwner,
}

/// Per-user visibility of jobs.
///
/// The store does not enforce ownership; every read path that hands a job to a
/// user must pass through this check.
///
/// - No IO
/// - No panics
pub fn authorize_job_access(session_user: UserId, job_owner: UserId) -> Result<(), AuthzError> {
    if session_user == job_owner {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}
