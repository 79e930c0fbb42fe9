//! `hrops-cache` — in-process TTL/tag cache for read models.
//!
//! Every data-access service reads through a [`TtlCache`] before touching the
//! backend: entries expire after a per-entry TTL and can be invalidated in
//! bulk via tags (e.g. dropping every `employees` entry after a bulk import).
//!
//! The cache is process-lifetime and best-effort only. A restart loses all
//! entries; callers must always be able to recompute.
//!
//! [`TtlCache::get_or_compute`] does **not** collapse concurrent misses for
//! the same key: two simultaneous callers both invoke the compute closure.
//! Callers that need single-flight behavior layer a [`RequestDeduplicator`]
//! keyed by the same cache key on top.

pub mod dedup;
pub mod ttl;

pub use dedup::RequestDeduplicator;
pub use ttl::{CacheConfig, CacheStats, SetOptions, TtlCache};
