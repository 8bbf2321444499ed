//! Human-readable booking codes: `PREFIX-YYYYMMDD-NNNNNN`.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use carhire_core::error::{DomainError, DomainResult, codes};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Driver booking prefix.
pub const DRIVER_PREFIX: &str = "DRV";
/// Reservation prefix.
pub const RESERVATION_PREFIX: &str = "RSV";

/// Attempts before a code collision is reported.
pub const MAX_CODE_ATTEMPTS: usize = 5;

const SUFFIX_SPACE: u32 = 1_000_000;

/// Process-wide monotone suffix counter, wrapping at one million.
#[derive(Debug)]
pub struct BookingCodeGenerator {
    counter: AtomicU32,
}

impl BookingCodeGenerator {
    /// Counter seeded at random so restarts rarely reuse suffixes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(rand::thread_rng().gen_range(0..SUFFIX_SPACE))
    }

    /// Counter starting after `seed`.
    #[must_use]
    pub const fn with_seed(seed: u32) -> Self {
        Self {
            counter: AtomicU32::new(seed % SUFFIX_SPACE),
        }
    }

    fn next_suffix(&self) -> u32 {
        let previous = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some((n + 1) % SUFFIX_SPACE)
            })
            .unwrap_or_default();
        (previous + 1) % SUFFIX_SPACE
    }

    /// Next code for `prefix` dated `now`.
    #[must_use]
    pub fn next(&self, prefix: &str, now: DateTime<Utc>) -> String {
        format!("{prefix}-{}-{:06}", now.format("%Y%m%d"), self.next_suffix())
    }
}

impl Default for BookingCodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `insert` with fresh codes until storage accepts one.
///
/// # Errors
///
/// Any non-collision error from `insert`, or `DUPLICATE_BOOKING_CODE` after
/// [`MAX_CODE_ATTEMPTS`] collisions.
pub async fn with_fresh_code<T, F, Fut>(
    generator: &BookingCodeGenerator,
    prefix: &str,
    now: DateTime<Utc>,
    mut insert: F,
) -> DomainResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generator.next(prefix, now);
        match insert(code.clone()).await {
            Err(e) if e.code() == codes::DUPLICATE_BOOKING_CODE => {
                tracing::warn!(code, attempt, "Booking code collision, retrying");
            }
            other => return other,
        }
    }
    Err(DomainError::conflict(
        codes::DUPLICATE_BOOKING_CODE,
        format!("could not allocate a unique {prefix} code"),
    ))
}
