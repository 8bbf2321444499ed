//! # Carhire Runtime
//!
//! Execution helpers shared by the carhire services:
//!
//! - **Retry**: exponential backoff with a retryability predicate
//! - **Timeout**: bounded waits for gateway and mail calls
//! - **Jobs**: periodic sweepers with a shared shutdown signal

/// Retry logic with exponential backoff
pub mod retry;

/// Time budgets for external calls
pub mod timeout;

/// Periodic background jobs
pub mod jobs;

pub use jobs::{Shutdown, await_all, shutdown_signal, spawn_periodic};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
pub use timeout::{Elapsed, bounded, bounded_try};
