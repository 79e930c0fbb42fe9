//! Core job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Lowest-to-highest priority range; higher dequeues first.
pub const MAX_PRIORITY: u8 = 10;

/// Priority applied when `add` is called without one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job execution status.
///
/// `Pending → Processing → {Completed | Delayed | Failed}`; `Delayed` moves
/// back to `Pending` once its deadline elapses, `Failed` only via an explicit
/// manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed
    Processing,
    /// Completed successfully
    Completed,
    /// Exhausted its retry budget (or has no processor); dead-lettered
    Failed,
    /// Waiting out an initial delay or a retry backoff
    Delayed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID, assigned at enqueue time
    pub id: JobId,
    /// Type discriminator selecting the registered processor
    pub job_type: String,
    /// JSON payload, typed at the enqueue call site
    pub payload: serde_json::Value,
    /// 0–10, higher dequeues first
    pub priority: u8,
    /// Attempts consumed so far
    pub attempts: u32,
    /// Configured retries + 1, so "0 retries" still means one attempt
    pub max_attempts: u32,
    /// Current status
    pub status: JobStatus,
    /// Last failure message, if any
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the most recent attempt started
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Deadline for a `Delayed` job to become `Pending` again.
    /// Monotonic, not persisted.
    #[serde(skip)]
    pub run_at: Option<Instant>,
    /// Insertion order, used as the stable tie-break for equal priorities.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl Job {
    pub(crate) fn new(
        job_type: String,
        payload: serde_json::Value,
        priority: u8,
        max_attempts: u32,
        seq: u64,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            payload,
            priority,
            attempts: 0,
            max_attempts,
            status: JobStatus::Pending,
            error: None,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
            run_at: None,
            seq,
        }
    }

    /// Whether a `Delayed` job's deadline has elapsed.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.run_at {
            Some(at) => now >= at,
            None => true,
        }
    }
}

/// Entry in the dead-letter queue.
///
/// Snapshots are an audit log: retrying the failed job does not remove its
/// snapshot, `clear_dead_letter_queue` does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

/// Queue statistics snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub dead_lettered: usize,
    /// Jobs currently inside a spawned processing task.
    pub in_flight: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Delayed.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn job_without_deadline_is_always_due() {
        let job = Job::new("t".into(), serde_json::Value::Null, 5, 4, 0);
        assert!(job.is_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_job_becomes_due_at_deadline() {
        let mut job = Job::new("t".into(), serde_json::Value::Null, 5, 4, 0);
        job.run_at = Some(Instant::now() + Duration::from_secs(5));

        assert!(!job.is_due(Instant::now()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(job.is_due(Instant::now()));
    }
}
