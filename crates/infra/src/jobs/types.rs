//! Job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use formwork_core::{JobId, UserId, ValueMap};

/// Persisted state of one submitted unit of work.
///
/// There is no status enum: a job is finished iff `end_time` is set, and it
/// failed iff `error` is set as well. Only the worker writes `messages`,
/// `error` and `end_time`; everyone else reads through the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Assigned by the store on insert.
    pub id: JobId,
    /// Submitting user; immutable after creation.
    pub user_id: UserId,
    /// Display title.
    pub label: String,
    /// Submitted form values.
    pub values: ValueMap,
    /// Output of the action; empty until the job finishes.
    pub messages: Vec<String>,
    /// Present iff the action failed.
    pub error: Option<String>,
    /// Set by `JobQueue::enqueue`.
    pub submit_time: Option<DateTime<Utc>>,
    /// Unset while the job is queued or running.
    pub end_time: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(user_id: UserId, label: impl Into<String>, values: ValueMap) -> Self {
        Self {
            user_id,
            label: label.into(),
            values,
            ..Default::default()
        }
    }

    /// Job for a form submission, labelled `"<form name> <digest prefix>"`.
    pub fn from_submission(form_name: &str, user_id: UserId, values: ValueMap) -> Self {
        let digest = values.digest();
        let label = match form_name.trim() {
            "" => digest[..8].to_string(),
            name => format!("{} {}", name, &digest[..8]),
        };
        Self::new(user_id, label, values)
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.is_finished() && self.error.is_some()
    }

    pub(crate) fn mark_submitted(&mut self, at: DateTime<Utc>) {
        self.submit_time = Some(at);
    }

    /// Record the terminal state. Called once, by the worker.
    pub(crate) fn finish(&mut self, messages: Vec<String>, error: Option<String>, at: DateTime<Utc>) {
        self.messages = messages;
        self.error = error;
        self.end_time = Some(at);
    }
}
