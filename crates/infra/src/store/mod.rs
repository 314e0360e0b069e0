//! Durable storage for jobs and sessions.
//!
//! ## Semantics
//!
//! - Every successful write is committed before the call returns.
//! - Inserting a record whose key already exists fails with
//!   [`StoreError::AlreadyExists`] and leaves the store unchanged.
//! - Listing order is unspecified; callers sort when display order matters.
//! - Ownership of jobs is *not* enforced here (see `formwork_auth::authorize_job_access`).
//! - No retries: connectivity and constraint failures are returned as-is.

use std::sync::Arc;

use formwork_auth::Session;
use formwork_core::{JobId, SessionId, UserId};

use crate::jobs::Job;

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn job_not_found(id: JobId) -> Self {
        Self::NotFound(format!("job {id}"))
    }

    pub fn session_not_found(id: &SessionId) -> Self {
        Self::NotFound(format!("session {id}"))
    }
}

/// Job persistence.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job and return it with its assigned id.
    ///
    /// A job carrying an already assigned id keeps it, and fails with
    /// `AlreadyExists` if that id is taken.
    async fn insert_job(&self, job: Job) -> Result<Job, StoreError>;

    /// Replace the record with the same id.
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, id: JobId) -> Result<Job, StoreError>;

    /// Jobs submitted by `user_id`.
    async fn list_jobs_for_user(&self, user_id: UserId) -> Result<Vec<Job>, StoreError>;

    /// Every job (administrative view).
    async fn list_all_jobs(&self) -> Result<Vec<Job>, StoreError>;
}

/// Session persistence.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Remove the session; `NotFound` if there was none.
    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError>;
}

/// Full store used by the service: jobs, sessions and lifecycle.
#[async_trait::async_trait]
pub trait Store: JobStore + SessionStore {
    /// Release connections. Further calls fail with `Storage`.
    async fn close(&self);
}

/// Shared handle used by the web layer and the worker.
pub type SharedStore = Arc<dyn Store>;

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every `Store` implementation must show. Each backend's test
    //! module runs these against a fresh instance.

    use chrono::Utc;

    use formwork_core::ValueMap;

    use super::*;

    pub async fn empty_store_lists_nothing(store: &dyn Store) {
        assert!(store.list_all_jobs().await.unwrap().is_empty());
        assert!(store.list_jobs_for_user(UserId::new(1)).await.unwrap().is_empty());
    }

    pub async fn job_ids_autoincrement(store: &dyn Store) {
        let first = store.insert_job(Job::default()).await.unwrap();
        assert_eq!(first.id, JobId::new(1));
        let second = store.insert_job(Job::default()).await.unwrap();
        assert_eq!(second.id, JobId::new(2));
    }

    pub async fn duplicate_job_insert_leaves_store_unchanged(store: &dyn Store) {
        let mut values = ValueMap::new();
        values.push("key1", "value1");
        values.push("key2", "value2");
        let job = store
            .insert_job(Job::new(UserId::new(5), "test", values))
            .await
            .unwrap();

        let before = store.list_all_jobs().await.unwrap();

        let err = store.insert_job(job.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)), "{err:?}");

        let mut conflicting = Job::new(UserId::new(9), "other", ValueMap::new());
        conflicting.id = job.id;
        let err = store.insert_job(conflicting).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)), "{err:?}");

        let after = store.list_all_jobs().await.unwrap();
        assert_eq!(before, after);
        assert_eq!(store.get_job(job.id).await.unwrap(), job);
    }

    pub async fn get_missing_job_is_not_found(store: &dyn Store) {
        let err = store.get_job(JobId::new(1000)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    pub async fn update_persists_terminal_fields(store: &dyn Store) {
        let mut job = store
            .insert_job(Job::new(UserId::new(1), "fin", ValueMap::new()))
            .await
            .unwrap();
        assert!(!store.get_job(job.id).await.unwrap().is_finished());

        job.finish(vec!["a".into(), "b".into()], Some("failed".into()), Utc::now());
        store.update_job(&job).await.unwrap();

        let loaded = store.get_job(job.id).await.unwrap();
        assert!(loaded.is_finished());
        assert_eq!(loaded.messages, vec!["a", "b"]);
        assert_eq!(loaded.error.as_deref(), Some("failed"));
    }

    pub async fn update_missing_job_is_not_found(store: &dyn Store) {
        let mut ghost = Job::default();
        ghost.id = JobId::new(77);
        let err = store.update_job(&ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    pub async fn user_listing_filters_by_owner(store: &dyn Store) {
        let me = UserId::new(42);
        for _ in 0..20 {
            store
                .insert_job(Job::new(me, "testuserjob", ValueMap::new()))
                .await
                .unwrap();
        }
        for i in 0..50 {
            store
                .insert_job(Job::new(UserId::new(52 + i), "OtherJob", ValueMap::new()))
                .await
                .unwrap();
        }

        let mine = store.list_jobs_for_user(me).await.unwrap();
        assert_eq!(mine.len(), 20);
        assert!(mine.iter().all(|j| j.user_id == me && j.label == "testuserjob"));
        assert_eq!(store.list_all_jobs().await.unwrap().len(), 70);
    }

    pub async fn session_lifecycle(store: &dyn Store) {
        let session = Session::new(UserId::new(3), "faketoken");
        store.insert_session(&session).await.unwrap();

        let err = store.insert_session(&session).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        let mut dupe = Session::new(UserId::new(4), "anothertoken");
        dupe.id = session.id.clone();
        let err = store.insert_session(&dupe).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        let loaded = store.get_session(&session.id).await.unwrap();
        assert_eq!(loaded.user_id, session.user_id);
        assert_eq!(loaded.token, "faketoken");

        let other = Session::new(UserId::new(5), "kept");
        store.insert_session(&other).await.unwrap();

        store.delete_session(&session.id).await.unwrap();
        let err = store.get_session(&session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.get_session(&other.id).await.is_ok());

        let err = store.delete_session(&session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
