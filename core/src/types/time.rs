use crate::error::{DomainError, DomainResult, codes};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting empty or inverted intervals.
    ///
    /// # Errors
    ///
    /// `INVALID_TIME_WINDOW` when `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if start >= end {
            return Err(DomainError::validation(
                codes::INVALID_TIME_WINDOW,
                "start must be strictly before end",
            ));
        }
        Ok(Self { start, end })
    }

    /// Window of `hours` starting at `start`.
    ///
    /// # Errors
    ///
    /// `INVALID_TIME_WINDOW` when `hours` is zero.
    pub fn from_hours(start: DateTime<Utc>, hours: u32) -> DomainResult<Self> {
        Self::new(start, start + Duration::hours(i64::from(hours)))
    }

    /// Inclusive start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open overlap: touching boundaries do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && self.end > other.start
    }
}
