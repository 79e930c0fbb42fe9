//! Queue + runner end-to-end tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::{AddOptions, JobQueue, JobQueueConfig, JobRunner, JobStatus, RunnerConfig};

#[tokio::test(start_paused = true)]
async fn runner_drains_jobs_on_its_cadence() {
    hrops_observability::init();

    let queue = JobQueue::arc(JobQueueConfig::default());
    let processed = Arc::new(AtomicU32::new(0));
    {
        let processed = processed.clone();
        queue.register_fn("notify", move |_job| {
            let processed = processed.clone();
            async move {
                processed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    let runner = JobRunner::new(queue.clone(), RunnerConfig::default());
    runner.start();
    runner.start(); // idempotent

    let id = queue.add("notify", (), AddOptions::default()).unwrap();

    // No manual dispatch: the runner's tick picks it up.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(queue.get_job(id).unwrap().status, JobStatus::Completed);
    assert_eq!(processed.load(Ordering::SeqCst), 1);

    runner.stop().await;
    runner.stop().await; // idempotent
}

#[tokio::test(start_paused = true)]
async fn runner_promotes_delayed_jobs_when_due() {
    let queue = JobQueue::arc(JobQueueConfig::default());
    queue.register_fn("digest", |_job| async { Ok(()) });

    let runner = JobRunner::new(queue.clone(), RunnerConfig::default());
    runner.start();

    let id = queue
        .add("digest", (), AddOptions::default().with_delay(Duration::from_secs(5)))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(queue.get_job(id).unwrap().status, JobStatus::Delayed);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(queue.get_job(id).unwrap().status, JobStatus::Completed);

    runner.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stopped_runner_leaves_jobs_pending() {
    let queue = JobQueue::arc(JobQueueConfig::default());
    queue.register_fn("notify", |_job| async { Ok(()) });

    let runner = JobRunner::new(queue.clone(), RunnerConfig::default());
    runner.start();
    runner.stop().await;

    let id = queue.add("notify", (), AddOptions::default()).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(queue.get_job(id).unwrap().status, JobStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn runner_retries_failing_jobs_to_the_dead_letter_queue() {
    let queue = JobQueue::arc(JobQueueConfig::default().with_max_retries(1));
    queue.register_fn("flaky-export", |_job| async {
        Err(anyhow::anyhow!("storage quota exceeded"))
    });

    let runner = JobRunner::new(queue.clone(), RunnerConfig::default());
    runner.start();

    let id = queue.add("flaky-export", (), AddOptions::default()).unwrap();

    // Attempt 1 on the first tick, 1s backoff, attempt 2, dead-letter.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let job = queue.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 2);
    assert_eq!(queue.dead_letter_queue().len(), 1);
    assert_eq!(queue.stats().dead_lettered, 1);

    runner.stop().await;
}

#[tokio::test(start_paused = true)]
async fn restarted_runner_resumes_dispatching() {
    let queue = JobQueue::arc(JobQueueConfig::default());
    queue.register_fn("notify", |_job| async { Ok(()) });

    let runner = JobRunner::new(queue.clone(), RunnerConfig::default());
    runner.start();
    runner.stop().await;

    let id = queue.add("notify", (), AddOptions::default()).unwrap();
    runner.start();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(queue.get_job(id).unwrap().status, JobStatus::Completed);

    runner.stop().await;
}
