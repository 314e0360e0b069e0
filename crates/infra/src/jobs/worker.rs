//! Single sequential consumer of the job queue.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::action::{ActionError, ActionOutcome, PostAction};
use super::queue::{JobReceiver, QueuedJob};
use super::Job;
use crate::store::SharedStore;
use crate::upstream::{Clients, UpstreamClient};

/// What `WorkerHandle::stop` does about a job that is running at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Return once the in-flight job (if any) is finished and persisted.
    #[default]
    WaitForRunning,
    /// Return immediately; the in-flight job completes in the background.
    Detach,
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_panicked: u64,
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Stop taking jobs off the queue. Jobs still queued are not run; their
    /// records stay unfinished in the store.
    pub async fn stop(mut self, policy: ShutdownPolicy) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(join) = self.join.take() else {
            return;
        };
        match policy {
            ShutdownPolicy::WaitForRunning => {
                if let Err(e) = join.await {
                    error!(error = %e, "job worker task ended abnormally");
                }
            }
            ShutdownPolicy::Detach => drop(join),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        lock(&self.stats).clone()
    }

    /// True once the worker loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

enum Verdict {
    Succeeded,
    Failed,
    Panicked,
}

/// Runs queued jobs one at a time, in queue order.
///
/// Holds the bot client for the process lifetime; each job brings its own
/// user client.
#[derive(Clone)]
pub struct Worker {
    store: SharedStore,
    bot: UpstreamClient,
    action: Option<PostAction>,
}

impl Worker {
    pub fn new(store: SharedStore, bot: UpstreamClient, action: Option<PostAction>) -> Self {
        Self { store, bot, action }
    }

    /// Spawn the worker loop on the current tokio runtime.
    pub fn spawn(self, receiver: JobReceiver) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let join = tokio::spawn(worker_loop(self, receiver, shutdown_rx, stats.clone()));

        WorkerHandle {
            shutdown: Some(shutdown_tx),
            join: Some(join),
            stats,
        }
    }

    /// Execute one job and persist its terminal state.
    ///
    /// Always sets `end_time` and writes the record back, whatever the action
    /// does (including panicking). A failed write is logged, not returned.
    pub async fn run(&self, item: QueuedJob) -> Job {
        self.execute(item).await.0
    }

    #[instrument(skip_all, fields(job_id = %item.job.id, user_id = %item.job.user_id, label = %item.job.label))]
    async fn execute(&self, item: QueuedJob) -> (Job, Verdict) {
        let QueuedJob { mut job, user } = item;
        info!("starting job");

        let clients = Clients::new(self.bot.clone(), user);
        let outcome = match &self.action {
            Some(action) => invoke(action, job.values.clone(), clients).await,
            None => ActionOutcome::default(),
        };

        let verdict = match &outcome.error {
            None => {
                info!(messages = outcome.messages.len(), "job finished");
                Verdict::Succeeded
            }
            Some(ActionError::Panicked(msg)) => {
                error!(panic = %msg, "job action panicked");
                Verdict::Panicked
            }
            Some(e) => {
                warn!(error = %e, "job failed");
                Verdict::Failed
            }
        };

        let error = outcome.error.map(|e| e.to_string());
        job.finish(outcome.messages, error, Utc::now());
        if let Err(e) = self.store.update_job(&job).await {
            error!(error = %e, "failed to persist finished job");
        }
        (job, verdict)
    }
}

/// Call the action so that a panic, whether while building the future or
/// while polling it, becomes an `ActionError::Panicked` outcome.
async fn invoke(action: &PostAction, values: formwork_core::ValueMap, clients: Clients) -> ActionOutcome {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| action(values, clients))) {
        Ok(future) => future,
        Err(payload) => return panicked(panic_message(payload.as_ref())),
    };
    match tokio::spawn(future).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => panicked(panic_message(e.into_panic().as_ref())),
        Err(e) => panicked(e.to_string()),
    }
}

fn panicked(msg: String) -> ActionOutcome {
    ActionOutcome::failed(Vec::new(), ActionError::Panicked(msg))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn worker_loop(
    worker: Worker,
    mut receiver: JobReceiver,
    mut shutdown_rx: oneshot::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    debug!("job worker loop running");

    loop {
        let item = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            item = receiver.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let (_, verdict) = worker.execute(item).await;

        let mut s = lock(&stats);
        s.jobs_processed += 1;
        match verdict {
            Verdict::Succeeded => s.jobs_succeeded += 1,
            Verdict::Failed => s.jobs_failed += 1,
            Verdict::Panicked => s.jobs_panicked += 1,
        }
    }

    debug!("job worker loop stopped");
}

fn lock(stats: &Mutex<WorkerStats>) -> std::sync::MutexGuard<'_, WorkerStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use formwork_core::{UserId, ValueMap};

    use super::*;
    use crate::jobs::action::post_action;
    use crate::jobs::queue::{EnqueueError, JobQueue, job_queue};
    use crate::store::InMemoryStore;

    fn bot() -> UpstreamClient {
        UpstreamClient::new("http://vcs", "bot-token")
    }

    fn user() -> UpstreamClient {
        bot().with_token("user-token")
    }

    /// Echoes `"key:v1 v2"` per key, sleeps `duration` ms, fails when the
    /// first value of any key is `"error"` (after echoing everything).
    fn echo() -> PostAction {
        post_action(|values: ValueMap, _clients: Clients| async move {
            let mut messages = Vec::new();
            let mut failed = false;
            for (key, vals) in values.iter() {
                messages.push(format!("{}:{}", key, vals.join(" ")));
                failed |= vals.first().is_some_and(|v| v == "error");
            }
            if let Some(ms) = values.first("duration").and_then(|d| d.parse().ok()) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            if failed {
                ActionOutcome::failed(messages, ActionError::failed("value \"error\" submitted"))
            } else {
                ActionOutcome::ok(messages)
            }
        })
    }

    fn setup(action: Option<PostAction>, capacity: usize) -> (SharedStore, JobQueue, WorkerHandle) {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let (queue, rx) = job_queue(store.clone(), capacity);
        let handle = Worker::new(store.clone(), bot(), action).spawn(rx);
        (store, queue, handle)
    }

    async fn wait_processed(handle: &WorkerHandle, n: u64) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while handle.stats().jobs_processed < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker did not process jobs in time");
    }

    fn values(pairs: &[(&str, &str)]) -> ValueMap {
        let mut map = ValueMap::new();
        for (k, v) in pairs {
            map.push(*k, *v);
        }
        map
    }

    #[tokio::test]
    async fn echo_action_messages_are_persisted() {
        let (store, queue, handle) = setup(Some(echo()), 10);
        let job = queue
            .enqueue(
                Job::new(UserId::new(1), "echo", values(&[("Ω", "omega"), ("A", "alpha")])),
                user(),
            )
            .await
            .unwrap();
        wait_processed(&handle, 1).await;

        let done = store.get_job(job.id).await.unwrap();
        assert!(done.is_finished());
        assert_eq!(done.messages, vec!["A:alpha", "Ω:omega"]);
        assert!(done.error.is_none());
        assert_eq!(handle.stats().jobs_succeeded, 1);
        handle.stop(ShutdownPolicy::WaitForRunning).await;
    }

    #[tokio::test]
    async fn failed_action_keeps_messages_and_error() {
        let (store, queue, handle) = setup(Some(echo()), 10);
        let job = queue
            .enqueue(
                Job::new(UserId::new(1), "echo", values(&[("A", "error"), ("B", "beta")])),
                user(),
            )
            .await
            .unwrap();
        wait_processed(&handle, 1).await;

        let done = store.get_job(job.id).await.unwrap();
        assert!(done.is_failed());
        assert!(!done.error.as_deref().unwrap_or_default().is_empty());
        assert_eq!(done.messages, vec!["A:error", "B:beta"]);
        assert_eq!(handle.stats().jobs_failed, 1);
        handle.stop(ShutdownPolicy::WaitForRunning).await;
    }

    #[tokio::test]
    async fn panicking_action_still_finishes_the_job() {
        let boom = post_action(|values: ValueMap, _clients: Clients| async move {
            if values.first("explode").is_some() {
                panic!("kaboom");
            }
            ActionOutcome::ok(vec!["fine".into()])
        });
        let (store, queue, handle) = setup(Some(boom), 10);

        let bad = queue
            .enqueue(Job::new(UserId::new(1), "bad", values(&[("explode", "1")])), user())
            .await
            .unwrap();
        let good = queue
            .enqueue(Job::new(UserId::new(1), "good", ValueMap::new()), user())
            .await
            .unwrap();
        wait_processed(&handle, 2).await;

        let bad = store.get_job(bad.id).await.unwrap();
        assert!(bad.is_failed());
        assert!(bad.error.unwrap().contains("kaboom"));

        let good = store.get_job(good.id).await.unwrap();
        assert_eq!(good.messages, vec!["fine"]);

        let stats = handle.stats();
        assert_eq!(stats.jobs_panicked, 1);
        assert_eq!(stats.jobs_succeeded, 1);
        handle.stop(ShutdownPolicy::WaitForRunning).await;
    }

    #[tokio::test]
    async fn missing_action_finishes_with_no_messages() {
        let (store, queue, handle) = setup(None, 10);
        let job = queue
            .enqueue(Job::new(UserId::new(1), "noop", values(&[("a", "b")])), user())
            .await
            .unwrap();
        wait_processed(&handle, 1).await;

        let done = store.get_job(job.id).await.unwrap();
        assert!(done.is_finished());
        assert!(done.messages.is_empty());
        assert!(done.error.is_none());
        handle.stop(ShutdownPolicy::WaitForRunning).await;
    }

    #[tokio::test]
    async fn action_receives_both_credentials() {
        let seen = Arc::new(Mutex::new(None));
        let record = seen.clone();
        let action = post_action(move |_values: ValueMap, clients: Clients| {
            let record = record.clone();
            async move {
                *record.lock().unwrap() = Some((
                    clients.bot.token().map(str::to_string),
                    clients.user.token().map(str::to_string),
                ));
                ActionOutcome::default()
            }
        });
        let (_store, queue, handle) = setup(Some(action), 10);
        queue
            .enqueue(Job::new(UserId::new(1), "creds", ValueMap::new()), user())
            .await
            .unwrap();
        wait_processed(&handle, 1).await;

        let (bot_token, user_token) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(bot_token.as_deref(), Some("bot-token"));
        assert_eq!(user_token.as_deref(), Some("user-token"));
        handle.stop(ShutdownPolicy::WaitForRunning).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_run_in_enqueue_order_one_at_a_time() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let overlap = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let action = {
            let (order, running, overlap) = (order.clone(), running.clone(), overlap.clone());
            post_action(move |values: ValueMap, _clients: Clients| {
                let (order, running, overlap) = (order.clone(), running.clone(), overlap.clone());
                async move {
                    use std::sync::atomic::Ordering::SeqCst;
                    if running.fetch_add(1, SeqCst) > 0 {
                        overlap.store(true, SeqCst);
                    }
                    tokio::task::yield_now().await;
                    order
                        .lock()
                        .unwrap()
                        .push(values.first("seq").unwrap_or_default().to_string());
                    running.fetch_sub(1, SeqCst);
                    ActionOutcome::default()
                }
            })
        };
        let (_store, queue, handle) = setup(Some(action), 8);

        let mut submitters = Vec::new();
        for t in 0..8 {
            let queue = queue.clone();
            submitters.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for i in 0..10 {
                    let seq = format!("{t}-{i}");
                    let job = queue
                        .enqueue(
                            Job::new(UserId::new(t), "seq", values(&[("seq", seq.as_str())])),
                            user(),
                        )
                        .await
                        .unwrap();
                    ids.push((job.id, seq));
                }
                ids
            }));
        }
        let mut enqueued = Vec::new();
        for s in submitters {
            enqueued.extend(s.await.unwrap());
        }
        wait_processed(&handle, 80).await;

        enqueued.sort_by_key(|(id, _)| *id);
        let expected: Vec<String> = enqueued.into_iter().map(|(_, seq)| seq).collect();
        assert_eq!(*order.lock().unwrap(), expected);
        assert!(!overlap.load(std::sync::atomic::Ordering::SeqCst));
        handle.stop(ShutdownPolicy::WaitForRunning).await;
    }

    #[tokio::test]
    async fn many_users_through_the_queue() {
        let (store, queue, handle) = setup(Some(echo()), 100);
        let me = UserId::new(4242);
        for _ in 0..200 {
            queue
                .enqueue(Job::new(me, "testuserjob", values(&[("k", "v")])), user())
                .await
                .unwrap();
        }
        for i in 0..1000 {
            queue
                .enqueue(Job::new(UserId::new(i % 37), "OtherJob", ValueMap::new()), user())
                .await
                .unwrap();
        }
        wait_processed(&handle, 1200).await;

        let mine = store.list_jobs_for_user(me).await.unwrap();
        assert_eq!(mine.len(), 200);
        assert!(mine.iter().all(|j| j.label == "testuserjob" && j.is_finished()));
        handle.stop(ShutdownPolicy::WaitForRunning).await;
    }

    #[tokio::test]
    async fn stop_waits_for_running_job_and_leaves_queue_undrained() {
        let (store, queue, handle) = setup(Some(echo()), 10);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let job = queue
                .enqueue(Job::new(UserId::new(1), "slow", values(&[("duration", "200")])), user())
                .await
                .unwrap();
            ids.push(job.id);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.stop(ShutdownPolicy::WaitForRunning).await;

        assert!(store.get_job(ids[0]).await.unwrap().is_finished());
        for id in &ids[1..] {
            let stuck = store.get_job(*id).await.unwrap();
            assert!(stuck.end_time.is_none());
            assert!(stuck.submit_time.is_some());
        }
        let err = queue
            .enqueue(Job::new(UserId::new(1), "after", ValueMap::new()), user())
            .await
            .unwrap_err();
        assert_eq!(err, EnqueueError::Closed);
    }

    #[tokio::test]
    async fn detached_stop_returns_before_running_job_ends() {
        let (store, queue, handle) = setup(Some(echo()), 10);
        let job = queue
            .enqueue(Job::new(UserId::new(1), "slow", values(&[("duration", "300")])), user())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.stop(ShutdownPolicy::Detach).await;
        assert!(!store.get_job(job.id).await.unwrap().is_finished());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(store.get_job(job.id).await.unwrap().is_finished());
    }

    #[test]
    fn shutdown_policy_names() {
        let p: ShutdownPolicy = serde_json::from_str("\"detach\"").unwrap();
        assert_eq!(p, ShutdownPolicy::Detach);
        assert_eq!(
            serde_json::to_string(&ShutdownPolicy::default()).unwrap(),
            "\"wait_for_running\""
        );
    }
}
