//! # Carhire Testing
//!
//! Testing utilities for the carhire services.
//!
//! This crate provides:
//! - Deterministic clocks and id generators
//! - A scripted payment gateway
//! - Recording broadcaster and mailer
//! - Entity fixtures and proptest strategies
//!
//! ## Example
//!
//! ```
//! use carhire_testing::{ManualClock, at};
//! use carhire_core::environment::Clock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(at("2025-03-01T10:00:00Z"));
//! clock.advance(Duration::minutes(15));
//! assert_eq!(clock.now(), at("2025-03-01T10:15:00Z"));
//! ```

#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};

pub mod fixtures;
pub mod gateway;
pub mod recorders;

/// Mock implementations of the environment traits.
pub mod mocks {
    use super::{DateTime, Utc};
    use carhire_core::environment::{Clock, IdGenerator};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, PoisonError};
    use uuid::Uuid;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: chrono::Duration) {
            let mut t = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *t += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Predictable ids: 1, 2, 3, ... encoded as UUIDs.
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start at 1.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_uuid(&self) -> Uuid {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Uuid::from_u128(u128::from(n))
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(super::at("2025-01-01T00:00:00Z"))
    }
}

/// Parse an RFC 3339 timestamp.
///
/// # Panics
///
/// Panics on malformed input; only meant for literals in tests.
#[must_use]
#[allow(clippy::expect_used)]
pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("test timestamp should be valid RFC 3339")
        .with_timezone(&Utc)
}

/// Install a test-friendly tracing subscriber once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use super::{DateTime, Utc, at};
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    /// `(start, hours)` pairs within a two-day horizon on the hour.
    pub fn arb_slot() -> impl Strategy<Value = (DateTime<Utc>, u32)> {
        (0i64..48, 1u32..8).prop_map(|(offset, hours)| {
            (at("2025-03-01T00:00:00Z") + Duration::hours(offset), hours)
        })
    }

    /// Positive money amounts with two decimal places, up to 10 000.00.
    pub fn arb_amount() -> impl Strategy<Value = Decimal> {
        (1i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, SequentialIdGenerator, test_clock};
