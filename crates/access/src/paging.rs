//! Validated pagination and chunked batch operations.

use std::future::Future;
use std::ops::Range;

use futures_util::future::try_join_all;
use hrops_core::RetryPolicy;
use serde::Serialize;

use crate::retry::{RetryError, with_retry};

/// Hard upper bound on rows per page, matching the backend's per-request cap.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Data-access error.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Bad request parameters. Fails fast; the backend is never called.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The underlying operation kept failing past the retry budget.
    #[error(transparent)]
    Retry(#[from] RetryError),
}

/// Sort specification forwarded to the underlying fetch.
#[derive(Debug, Clone, Serialize)]
pub struct Sort {
    pub column: String,
    pub ascending: bool,
}

impl Sort {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// A pagination request. Pages are 1-based.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
    pub sort: Option<Sort>,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// One page of results plus paging metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Total row count for the resource, as reported by the fetch.
    pub count: usize,
    pub has_more: bool,
    pub page: usize,
}

/// Paginated fetch and chunked bulk-write primitives for domain services.
///
/// Composes [`with_retry`] around every underlying call; the caller supplies
/// the actual backend operation as an async closure.
#[derive(Debug, Clone, Default)]
pub struct DataAccess {
    policy: RetryPolicy,
}

impl DataAccess {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Fetch one page of `resource`.
    ///
    /// Validates the request, computes the half-open row range
    /// `[(page-1)*size, page*size)`, and runs `fetch` under the retry policy.
    /// `fetch` returns the rows in range plus the total row count.
    pub async fn fetch_paginated<T, F, Fut>(
        &self,
        resource: &str,
        request: &PageRequest,
        mut fetch: F,
    ) -> Result<Page<T>, AccessError>
    where
        F: FnMut(Range<usize>, Option<Sort>) -> Fut,
        Fut: Future<Output = anyhow::Result<(Vec<T>, usize)>>,
    {
        if request.page < 1 {
            return Err(AccessError::Validation("page must be >= 1".to_string()));
        }
        if request.page_size < 1 || request.page_size > MAX_PAGE_SIZE {
            return Err(AccessError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let start = (request.page - 1) * request.page_size;
        let end = start + request.page_size;
        let operation = format!("fetch {resource} page {}", request.page);

        let (data, count) = with_retry(&operation, &self.policy, || {
            fetch(start..end, request.sort.clone())
        })
        .await?;

        Ok(Page {
            has_more: request.page * request.page_size < count,
            page: request.page,
            data,
            count,
        })
    }

    /// Run `op` once per chunk of `batch_size` items, all chunks concurrently.
    ///
    /// Each chunk call is independently wrapped in [`with_retry`]; results
    /// come back in chunk order. Intended for bulk writes/imports bounded by
    /// the backend's per-request item limit.
    pub async fn batch_operation<T, R, F, Fut>(
        &self,
        operation: &str,
        items: Vec<T>,
        batch_size: usize,
        op: F,
    ) -> Result<Vec<R>, AccessError>
    where
        T: Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        if batch_size < 1 {
            return Err(AccessError::Validation(
                "batch_size must be >= 1".to_string(),
            ));
        }

        let chunks: Vec<Vec<T>> = items.chunks(batch_size).map(<[T]>::to_vec).collect();
        tracing::debug!(operation, chunks = chunks.len(), batch_size, "starting batch operation");

        let policy = &self.policy;
        let op = &op;
        let results = try_join_all(chunks.into_iter().enumerate().map(|(index, chunk)| {
            async move {
                let name = format!("{operation} chunk {index}");
                with_retry(&name, policy, || op(chunk.clone())).await
            }
        }))
        .await?;

        Ok(results)
    }
}
