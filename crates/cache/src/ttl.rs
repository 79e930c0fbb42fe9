//! TTL/tag cache implementation.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without an explicit one.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
        }
    }
}

/// Per-entry options for `set` / `get_or_compute`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Overrides the cache-wide default TTL.
    pub ttl: Option<Duration>,
    /// Labels for bulk invalidation.
    pub tags: Vec<String>,
}

impl SetOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Diagnostic counters. No correctness contract.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Entries currently stored (expired-but-unpurged entries included).
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because a lookup or sweep found them past their TTL.
    pub expired: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    tags: HashSet<String>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

/// In-process key/value cache with per-entry expiry and tag invalidation.
///
/// Generic over the value type: each call site owns a cache for its own read
/// model instead of sharing one untyped map. Expired entries are purged
/// lazily on lookup; no background sweep is required for correctness
/// ([`purge_expired`](Self::purge_expired) exists as an optimization).
#[derive(Debug)]
pub struct TtlCache<V> {
    config: CacheConfig,
    entries: RwLock<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Store (or overwrite) an entry. Always succeeds.
    pub fn set(&self, key: impl Into<String>, value: V, options: SetOptions) {
        let entry = Entry {
            value,
            stored_at: Instant::now(),
            ttl: options.ttl.unwrap_or(self.config.default_ttl),
            tags: options.tags.into_iter().collect(),
        };
        self.entries.write().unwrap().insert(key.into(), entry);
    }

    /// Look up a key. Returns `None` on miss or expiry.
    ///
    /// An expired entry is removed as a side effect of the lookup, so a
    /// subsequent `set` starts from a clean slate (no resurrection).
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {} // expired, purge below
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut entries = self.entries.write().unwrap();
        // Re-check under the write lock; another caller may have raced us.
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove exactly one entry. Idempotent; returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }

    /// Remove every entry whose tag set contains `tag`.
    ///
    /// O(entries) scan; returns the number of entries removed.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.contains(tag));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(tag, removed, "invalidated cache entries by tag");
        }
        removed
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// On a hit the compute closure is never invoked. On a miss the closure
    /// runs; its failure propagates to the caller and nothing is cached (no
    /// negative caching). Concurrent misses for the same key are **not**
    /// de-duplicated; see [`RequestDeduplicator`](crate::RequestDeduplicator).
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        options: SetOptions,
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone(), options);
        Ok(value)
    }

    /// Drop every entry whose TTL has elapsed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    /// Current diagnostic counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().unwrap().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
