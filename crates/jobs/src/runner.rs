//! Timer-driven queue driver loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::queue::JobQueue;

/// Driver loop configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often to trigger a dispatch tick.
    pub tick_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Recurring tick that drains the job queue.
///
/// Holds no business state of its own: each tick only invokes
/// [`JobQueue::dispatch`]. `start` and `stop` are both idempotent.
pub struct JobRunner {
    queue: Arc<JobQueue>,
    config: RunnerConfig,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobRunner {
    pub fn new(queue: Arc<JobQueue>, config: RunnerConfig) -> Self {
        Self {
            queue,
            config,
            shutdown: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Begin ticking. Starting an already-started runner is a no-op.
    pub fn start(&self) {
        let mut guard = self.handle.lock().unwrap();
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let queue = Arc::clone(&self.queue);
        let shutdown = Arc::clone(&self.shutdown);
        let tick_interval = self.config.tick_interval;

        *guard = Some(tokio::spawn(async move {
            tracing::info!(tick_ms = tick_interval.as_millis() as u64, "job runner started");

            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = interval.tick() => {
                        let started = queue.dispatch();
                        if started > 0 {
                            tracing::debug!(started, "dispatch tick started jobs");
                        }
                    }
                }
            }

            tracing::info!("job runner stopped");
        }));
    }

    /// Cancel the recurring tick and wait for the loop to exit.
    /// Stopping an already-stopped runner is a no-op.
    pub async fn stop(&self) {
        let handle = self.handle.lock().unwrap().take();
        let Some(handle) = handle else {
            return;
        };

        self.shutdown.notify_one();
        let _ = handle.await;
    }
}
