//! Asynchronous job subsystem.
//!
//! ## Lifecycle
//!
//! `created -> enqueued -> running -> finished(success) | finished(error)`
//!
//! - `JobQueue::enqueue` stamps `submit_time`, persists the record, then
//!   pushes it onto a bounded FIFO. A job is never queued without a record.
//! - A single `Worker` consumes the FIFO strictly in order, one job at a time,
//!   and always writes back `end_time`, `messages` and `error`.
//! - Stopping the worker does not drain the queue: records of jobs still
//!   queued stay in the store with `end_time` unset.
//!
//! ## Components
//!
//! - `Job`: persisted state of one submission
//! - `PreAction` / `PostAction`: operator business logic
//! - `JobQueue` / `JobReceiver`: the bounded hand-off
//! - `Worker` / `WorkerHandle`: the consuming loop and its control handle

pub mod action;
pub mod queue;
pub mod types;
pub mod worker;

pub use action::{
    ActionError, ActionFuture, ActionOutcome, PostAction, PreAction, post_action, pre_action,
    preprocess_form,
};
pub use queue::{DEFAULT_QUEUE_CAPACITY, EnqueueError, JobQueue, JobReceiver, QueuedJob, job_queue};
pub use types::Job;
pub use worker::{ShutdownPolicy, Worker, WorkerHandle, WorkerStats};
