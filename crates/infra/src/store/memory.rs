//! In-memory store for tests/dev.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use formwork_auth::Session;
use formwork_core::{JobId, SessionId, UserId};

use super::{JobStore, SessionStore, Store, StoreError};
use crate::jobs::Job;

#[derive(Debug, Default)]
struct Tables {
    jobs: BTreeMap<JobId, Job>,
    last_job_id: i64,
    sessions: HashMap<SessionId, Session>,
    closed: bool,
}

/// Store backed by process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        let guard = self
            .tables
            .read()
            .map_err(|_| StoreError::Storage("store lock poisoned".into()))?;
        if guard.closed {
            return Err(StoreError::Storage("store is closed".into()));
        }
        Ok(guard)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        let guard = self
            .tables
            .write()
            .map_err(|_| StoreError::Storage("store lock poisoned".into()))?;
        if guard.closed {
            return Err(StoreError::Storage("store is closed".into()));
        }
        Ok(guard)
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryStore {
    async fn insert_job(&self, mut job: Job) -> Result<Job, StoreError> {
        let mut tables = self.write()?;
        if job.id.is_assigned() {
            if tables.jobs.contains_key(&job.id) {
                return Err(StoreError::AlreadyExists(format!("job {}", job.id)));
            }
        } else {
            job.id = JobId::new(tables.last_job_id + 1);
        }
        tables.last_job_id = tables.last_job_id.max(job.id.get());
        tables.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(StoreError::job_not_found(job.id)),
        }
    }

    async fn get_job(&self, id: JobId) -> Result<Job, StoreError> {
        self.read()?
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::job_not_found(id))
    }

    async fn list_jobs_for_user(&self, user_id: UserId) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .read()?
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.read()?.jobs.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists(format!("session {}", session.id)));
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.read()?
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::session_not_found(id))
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.write()?
            .sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::session_not_found(id))
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn close(&self) {
        if let Ok(mut tables) = self.tables.write() {
            tables.closed = true;
        }
    }
}
