//! Priority job queue with bounded concurrency, retry/backoff and DLQ.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use hrops_core::RetryPolicy;

use crate::types::{
    DEFAULT_PRIORITY, DeadLetterEntry, Job, JobId, JobStatus, MAX_PRIORITY, QueueStats,
};

/// Handler for one job type.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> anyhow::Result<()>;
}

type BoxedProcessFn =
    Box<dyn Fn(Job) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

struct FnProcessor {
    f: BoxedProcessFn,
}

#[async_trait]
impl JobProcessor for FnProcessor {
    async fn process(&self, job: &Job) -> anyhow::Result<()> {
        (self.f)(job.clone()).await
    }
}

/// Job queue configuration.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Retries after the first attempt; `max_attempts = max_retries + 1`
    pub max_retries: u32,
    /// Priority applied when `add` is called without one
    pub default_priority: u8,
    /// Per-job processing deadline. A timed-out processor consumes an
    /// attempt and its future is dropped, cancelling it at its next await
    /// point; work already done before that point is not rolled back.
    pub processing_timeout: Duration,
    /// Maximum in-flight jobs across all types
    pub max_concurrent: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            default_priority: DEFAULT_PRIORITY,
            processing_timeout: Duration::from_secs(30),
            max_concurrent: 5,
        }
    }
}

impl JobQueueConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_default_priority(mut self, priority: u8) -> Self {
        self.default_priority = priority.min(MAX_PRIORITY);
        self
    }

    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }
}

/// Per-job enqueue options.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// 0–10, clamped; defaults to the queue's `default_priority`
    pub priority: Option<u8>,
    /// Hold the job in `Delayed` for this long before it becomes `Pending`
    pub delay: Option<Duration>,
}

impl AddOptions {
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Enqueue error.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("failed to serialize job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// In-memory priority job queue.
///
/// One instance per process, constructed at application start and shared via
/// `Arc`. Dispatch is driven externally by a [`JobRunner`](crate::JobRunner)
/// (or directly in tests); the queue itself never spawns a timer.
pub struct JobQueue {
    config: JobQueueConfig,
    backoff: RetryPolicy,
    processors: RwLock<HashMap<String, Arc<dyn JobProcessor>>>,
    jobs: Mutex<HashMap<JobId, Job>>,
    dead_letters: Mutex<Vec<DeadLetterEntry>>,
    in_flight: AtomicUsize,
    next_seq: AtomicU64,
}

impl JobQueue {
    pub fn new(config: JobQueueConfig) -> Self {
        // Retry backoff: 1s, 2s, 4s, ... capped at one minute.
        let backoff = RetryPolicy::exponential(
            config.max_retries + 1,
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        Self {
            config,
            backoff,
            processors: RwLock::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            dead_letters: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn arc(config: JobQueueConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Bind a processor to a job type. A later registration for the same
    /// type overwrites the earlier one.
    pub fn register<P>(&self, job_type: impl Into<String>, processor: P)
    where
        P: JobProcessor + 'static,
    {
        let job_type = job_type.into();
        let previous = self
            .processors
            .write()
            .unwrap()
            .insert(job_type.clone(), Arc::new(processor));
        if previous.is_some() {
            debug!(job_type, "replaced job processor");
        }
    }

    /// Convenience wrapper to register an async closure as a processor.
    pub fn register_fn<F, Fut>(&self, job_type: impl Into<String>, f: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(
            job_type,
            FnProcessor {
                f: Box::new(move |job| Box::pin(f(job))),
            },
        );
    }

    /// Enqueue a job.
    ///
    /// The job starts `Pending`, or `Delayed` when `options.delay` is given.
    pub fn add<T: Serialize>(
        &self,
        job_type: impl Into<String>,
        data: T,
        options: AddOptions,
    ) -> Result<JobId, EnqueueError> {
        let payload = serde_json::to_value(data)?;
        let priority = options
            .priority
            .unwrap_or(self.config.default_priority)
            .min(MAX_PRIORITY);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let mut job = Job::new(
            job_type.into(),
            payload,
            priority,
            self.config.max_retries + 1,
            seq,
        );
        if let Some(delay) = options.delay {
            job.status = JobStatus::Delayed;
            job.run_at = Some(Instant::now() + delay);
        }

        let id = job.id;
        debug!(
            job_id = %id,
            job_type = %job.job_type,
            priority,
            delayed = options.delay.is_some(),
            "enqueued job"
        );
        self.jobs.lock().unwrap().insert(id, job);
        Ok(id)
    }

    /// One drain/dispatch tick.
    ///
    /// Promotes due `Delayed` jobs, then starts pending jobs in descending
    /// priority order (ties broken by insertion order) up to the concurrency
    /// ceiling. Jobs beyond the ceiling stay `Pending` for the next tick;
    /// jobs with no registered processor fail fast without occupying a slot.
    /// Returns the number of jobs started.
    pub fn dispatch(self: &Arc<Self>) -> usize {
        let now = Instant::now();
        let mut to_run: Vec<(Job, Arc<dyn JobProcessor>)> = Vec::new();

        {
            let mut jobs = self.jobs.lock().unwrap();

            for job in jobs.values_mut() {
                if job.status == JobStatus::Delayed && job.is_due(now) {
                    job.status = JobStatus::Pending;
                    job.run_at = None;
                }
            }

            let mut pending: Vec<(JobId, u8, u64)> = jobs
                .values()
                .filter(|j| j.status == JobStatus::Pending)
                .map(|j| (j.id, j.priority, j.seq))
                .collect();
            pending.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

            let mut slots = self
                .config
                .max_concurrent
                .saturating_sub(self.in_flight.load(Ordering::SeqCst));

            let processors = self.processors.read().unwrap();
            for (id, _, _) in pending {
                let Some(job) = jobs.get_mut(&id) else { continue };

                match processors.get(&job.job_type) {
                    Some(processor) => {
                        if slots == 0 {
                            continue;
                        }
                        slots -= 1;
                        job.status = JobStatus::Processing;
                        job.attempts += 1;
                        job.processed_at = Some(Utc::now());
                        self.in_flight.fetch_add(1, Ordering::SeqCst);
                        to_run.push((job.clone(), Arc::clone(processor)));
                    }
                    None => {
                        // Configuration error, not a transient failure: fail
                        // immediately without consuming an attempt.
                        let reason =
                            format!("no processor registered for job type '{}'", job.job_type);
                        warn!(job_id = %job.id, job_type = %job.job_type, "dead-lettering job with no processor");
                        job.status = JobStatus::Failed;
                        job.error = Some(reason.clone());
                        self.dead_letters
                            .lock()
                            .unwrap()
                            .push(DeadLetterEntry::new(job.clone(), reason));
                    }
                }
            }
        }

        let started = to_run.len();
        for (job, processor) in to_run {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.run_job(job, processor).await });
        }
        started
    }

    /// Run one claimed job: race the processor against the timeout, then
    /// record the outcome.
    async fn run_job(&self, job: Job, processor: Arc<dyn JobProcessor>) {
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "processing job"
        );

        let outcome =
            tokio::time::timeout(self.config.processing_timeout, processor.process(&job)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "processing timed out after {}ms",
                self.config.processing_timeout.as_millis()
            )),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut jobs = self.jobs.lock().unwrap();
        let Some(stored) = jobs.get_mut(&job.id) else {
            return;
        };

        match result {
            Ok(()) => {
                stored.status = JobStatus::Completed;
                stored.completed_at = Some(Utc::now());
                debug!(job_id = %stored.id, "job completed");
            }
            Err(err) => {
                let message = err.to_string();
                stored.error = Some(message.clone());

                if stored.attempts < stored.max_attempts {
                    let delay = self.backoff.delay_for_attempt(stored.attempts);
                    stored.status = JobStatus::Delayed;
                    stored.run_at = Some(Instant::now() + delay);
                    warn!(
                        job_id = %stored.id,
                        attempt = stored.attempts,
                        max_attempts = stored.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "job failed, retry scheduled"
                    );
                } else {
                    stored.status = JobStatus::Failed;
                    warn!(
                        job_id = %stored.id,
                        attempts = stored.attempts,
                        error = %message,
                        "job exhausted its retry budget, dead-lettering"
                    );
                    let snapshot = stored.clone();
                    self.dead_letters
                        .lock()
                        .unwrap()
                        .push(DeadLetterEntry::new(snapshot, message));
                }
            }
        }
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// Most recently enqueued jobs first.
    pub fn recent_jobs(&self, limit: usize) -> Vec<Job> {
        let jobs = self.jobs.lock().unwrap();
        let mut result: Vec<Job> = jobs.values().cloned().collect();
        result.sort_by(|a, b| b.seq.cmp(&a.seq));
        result.truncate(limit);
        result
    }

    /// Reset a `Failed` job to `Pending` for another round of attempts.
    ///
    /// Returns `false` (and changes nothing) for any other status. The job's
    /// historical dead-letter snapshot is left in place.
    pub fn retry_job(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Failed => {
                job.status = JobStatus::Pending;
                job.attempts = 0;
                job.error = None;
                job.run_at = None;
                debug!(job_id = %id, "failed job reset to pending for manual retry");
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the dead-letter list, oldest first.
    pub fn dead_letter_queue(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.lock().unwrap().clone()
    }

    /// Drop all dead-letter entries; returns how many were removed.
    pub fn clear_dead_letter_queue(&self) -> usize {
        let mut dead_letters = self.dead_letters.lock().unwrap();
        let removed = dead_letters.len();
        dead_letters.clear();
        removed
    }

    /// Counts per status plus dead-letter size and in-flight jobs.
    pub fn stats(&self) -> QueueStats {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = QueueStats {
            dead_lettered: self.dead_letters.lock().unwrap().len(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            ..Default::default()
        };

        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Delayed => stats.delayed += 1,
            }
        }

        stats
    }
}
