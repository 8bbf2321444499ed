//! Retry with exponential backoff for transient failures.
//!
//! Used for gateway polls and compare-and-set loops. Callers decide what is
//! retryable; everything else fails fast.
//!
//! # Example
//!
//! ```rust
//! use carhire_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new(2, Duration::from_millis(50));
//!
//! let status = retry_with_predicate(
//!     &policy,
//!     || async { Ok::<_, String>("Paid") },
//!     |err: &String| err.contains("timeout"),
//! )
//! .await?;
//! assert_eq!(status, "Paid");
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff: `initial_delay * multiplier^attempt`, capped at
/// `max_delay`, plus up to `jitter` of that at random.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth per attempt.
    pub multiplier: f64,
    /// Random fraction added to each delay, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    /// Doubling backoff from `initial_delay`, capped at five seconds, no jitter.
    #[must_use]
    pub const fn new(max_retries: usize, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    /// Single attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Short, tight loop for lost compare-and-set races.
    #[must_use]
    pub const fn compare_and_set() -> Self {
        Self::new(5, Duration::from_millis(5)).with_max_delay(Duration::from_millis(100))
    }

    /// Jittered backoff for status polls against the payment gateway.
    #[must_use]
    pub const fn gateway_poll() -> Self {
        Self::new(3, Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(2))
            .with_jitter(0.2)
    }

    /// Cap single delays at `max_delay`.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Grow delays by `multiplier` per attempt.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Add up to `jitter` (a fraction) of each delay at random.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt + 1`, without jitter.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(millis as u64)
    }

    /// [`delay_for_attempt`](Self::delay_for_attempt) stretched by jitter.
    #[must_use]
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.jitter.min(1.0));
        base + base.mul_f64(factor)
    }
}

/// Retry an async operation on every error.
///
/// # Errors
///
/// Returns the last error once `max_retries` is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}

/// Retry an async operation while `is_retryable` holds for its error.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once
/// `max_retries` is exhausted.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };
        if !is_retryable(&err) {
            return Err(err);
        }
        if attempt >= policy.max_retries {
            tracing::warn!(retries = attempt, error = %err, "Retries exhausted");
            return Err(err);
        }
        let delay = policy.jittered_delay(attempt);
        tracing::debug!(attempt, ?delay, error = %err, "Retrying");
        sleep(delay).await;
        attempt += 1;
    }
}
