//! `hrops-core` — shared infrastructure policy primitives.
//!
//! This crate contains the retry/backoff policy types used by both the
//! data-access retry wrapper and the background job queue. It carries no
//! runtime or I/O concerns.

pub mod retry;

pub use retry::{BackoffStrategy, RetryPolicy};
