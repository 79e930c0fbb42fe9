//! Single-flight companion for `get_or_compute`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Collapses concurrent identical in-flight computations into one.
///
/// [`TtlCache::get_or_compute`](crate::TtlCache::get_or_compute) deliberately
/// does not serialize concurrent misses. Callers that need the single-flight
/// property hold a per-key lock around the whole lookup-or-compute:
///
/// ```
/// # use std::sync::Arc;
/// # use hrops_cache::{RequestDeduplicator, SetOptions, TtlCache};
/// # async fn example(cache: Arc<TtlCache<String>>, dedup: Arc<RequestDeduplicator>) {
/// let value: Result<String, anyhow::Error> = dedup
///     .run("employee:42", || {
///         cache.get_or_compute("employee:42", SetOptions::default(), || async {
///             Ok("fetched".to_string())
///         })
///     })
///     .await;
/// # let _ = value;
/// # }
/// ```
///
/// The first caller computes; everyone queued behind it re-checks the cache
/// and hits. Keys are independent: holding `employee:42` never blocks
/// `employee:43`.
#[derive(Debug, Default)]
pub struct RequestDeduplicator {
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RequestDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// Concurrent callers for the same key run one at a time, in arrival
    /// order. The per-key lock is dropped from the map once the last caller
    /// releases it.
    pub async fn run<T, F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let gate = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = gate.lock().await;
            f().await
        };

        let mut in_flight = self.in_flight.lock().await;
        // Two references left means the map entry and ours: nobody is waiting.
        if Arc::strong_count(&gate) == 2 {
            in_flight.remove(key);
        }

        result
    }
}
