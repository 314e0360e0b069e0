//! Bounded FIFO hand-off between the web layer and the worker.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, instrument};

use super::Job;
use crate::store::{SharedStore, StoreError};
use crate::upstream::UpstreamClient;

/// Queue length used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("could not persist job: {0}")]
    Store(#[from] StoreError),
    #[error("job queue is closed")]
    Closed,
}

/// A persisted job on its way to the worker, with the client of the user
/// who submitted it.
#[derive(Debug)]
pub struct QueuedJob {
    pub job: Job,
    pub user: UpstreamClient,
}

/// Producer side. Cheap to clone; every clone feeds the same worker.
#[derive(Clone)]
pub struct JobQueue {
    store: SharedStore,
    tx: mpsc::Sender<QueuedJob>,
    // insert + push happen under this lock so that id order, queue order and
    // execution order are the same
    order: Arc<Mutex<()>>,
}

/// Consumer side, owned by the worker.
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::Receiver<QueuedJob>,
}

impl JobReceiver {
    pub async fn recv(&mut self) -> Option<QueuedJob> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<QueuedJob> {
        self.rx.try_recv().ok()
    }
}

/// Create a queue holding at most `capacity` pending jobs (minimum 1).
pub fn job_queue(store: SharedStore, capacity: usize) -> (JobQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let queue = JobQueue {
        store,
        tx,
        order: Arc::new(Mutex::new(())),
    };
    (queue, JobReceiver { rx })
}

impl JobQueue {
    /// Stamp, persist, then hand the job to the worker.
    ///
    /// The job is only queued once its record is durable; if the insert fails
    /// nothing is queued and the error is returned. Waits while the queue is
    /// full. Returns the job with its assigned id.
    #[instrument(skip_all, fields(user_id = %job.user_id, label = %job.label), err)]
    pub async fn enqueue(&self, mut job: Job, user: UpstreamClient) -> Result<Job, EnqueueError> {
        let _order = self.order.lock().await;
        if self.tx.is_closed() {
            return Err(EnqueueError::Closed);
        }

        job.mark_submitted(Utc::now());
        let job = self.store.insert_job(job).await?;

        self.tx
            .send(QueuedJob {
                job: job.clone(),
                user,
            })
            .await
            .map_err(|_| EnqueueError::Closed)?;

        debug!(job_id = %job.id, "job enqueued");
        Ok(job)
    }

    /// Free slots left before `enqueue` starts waiting.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}
