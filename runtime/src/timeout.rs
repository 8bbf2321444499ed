//! Bounded waits for external I/O.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The budget elapsed before the operation finished.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("operation exceeded its {0:?} budget")]
pub struct Elapsed(pub Duration);

/// Run `fut` with a time budget.
///
/// # Errors
///
/// [`Elapsed`] when `budget` passes first; the inner future is dropped.
pub async fn bounded<F, T>(budget: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| Elapsed(budget))
}

/// Run a fallible `fut` with a time budget, mapping the timeout into `E`.
///
/// # Errors
///
/// The inner error, or `on_timeout()` when the budget passes first.
pub async fn bounded_try<F, T, E>(
    budget: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX), "Operation timed out");
            Err(on_timeout())
        }
    }
}
