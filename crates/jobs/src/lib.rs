//! `hrops-jobs` — in-memory priority job queue for background work.
//!
//! Bulk payroll recalculations, notification dispatch and similar background
//! work is enqueued here by the domain services and drained by a
//! [`JobRunner`] on a fixed cadence. Jobs carry a priority (0–10, higher
//! first), optional delayed scheduling, a bounded retry budget with
//! exponential backoff, and land in a dead-letter list once that budget is
//! exhausted.
//!
//! Everything is in-memory and process-lifetime: a restart drops all queued,
//! delayed and dead-lettered jobs. Callers needing durability must persist
//! work elsewhere before enqueueing.

pub mod queue;
pub mod runner;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use queue::{AddOptions, EnqueueError, JobProcessor, JobQueue, JobQueueConfig};
pub use runner::{JobRunner, RunnerConfig};
pub use types::{
    DEFAULT_PRIORITY, DeadLetterEntry, Job, JobId, JobStatus, MAX_PRIORITY, QueueStats,
};
