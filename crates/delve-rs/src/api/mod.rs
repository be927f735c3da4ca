//! Remote-call plumbing shared by the model and search clients.
//!
//! - [`retry`]: [`Resilient`] wrapper and [`RetryConfig`] schedule: bounded
//!   retries with exponential backoff for rate limits and transient errors,
//!   immediate failure for fatal ones.

pub mod retry;

pub use retry::{Resilient, RetryConfig};
