//! Environment traits: time and identity.
//!
//! Services never call `Utc::now()` or `Uuid::new_v4()` directly. They hold an
//! `Arc<dyn Clock>` and an `Arc<dyn IdGenerator>` so tests can pin both.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```
/// use carhire_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock::new();
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never goes backwards.
///
/// If the system time steps back (NTP adjustment), the last returned instant
/// is returned again until the wall clock catches up.
#[derive(Debug)]
pub struct SystemClock {
    last: Mutex<DateTime<Utc>>,
}

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if wall > *last {
            *last = wall;
        }
        *last
    }
}

/// Source of opaque identifiers.
pub trait IdGenerator: Send + Sync {
    /// Next unique identifier.
    fn next_uuid(&self) -> Uuid;
}

/// Random v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}
