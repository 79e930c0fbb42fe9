//! `hrops-access` — retry wrapper and paginated/batch data-access helpers.
//!
//! Domain services (employee, payroll, attendance, leave) never call the
//! backend directly: reads and writes go through [`with_retry`], and list
//! screens and bulk imports use [`DataAccess`] for validated pagination and
//! chunked batch writes. The wrapped operation is an opaque async closure —
//! this crate only requires it to resolve on success and fail with an error.

pub mod paging;
pub mod retry;

pub use paging::{AccessError, DataAccess, Page, PageRequest, Sort};
pub use retry::{RetryError, with_retry};
