//! Availability index over blocking bookings.
//!
//! A vehicle is reserved by reservations in `pending`, `confirmed` or
//! `checked_out` that have it assigned; a driver by driver bookings in
//! `requested`, `accepted_by_driver` (or its alias) or `confirmed`. Intervals
//! are half-open, so back-to-back bookings do not collide.
//!
//! Every lookup goes to the repositories. A storage error propagates as a
//! transient error: callers never treat a failed lookup as "free".

use std::sync::Arc;

use carhire_core::error::{DomainError, DomainResult, codes};
use carhire_core::repository::{DriverBookingRepository, ReservationRepository};
use carhire_core::types::{
    DriverBooking, DriverBookingId, Reservation, ReservationId, TimeWindow, UserId, VehicleId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A bookable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// A vehicle unit, reserved by reservations.
    Vehicle(VehicleId),
    /// A driver, reserved by driver bookings.
    Driver(UserId),
}

impl Resource {
    const fn conflict_code(self) -> &'static str {
        match self {
            Self::Vehicle(_) => codes::VEHICLE_TIME_CONFLICT,
            Self::Driver(_) => codes::DRIVER_TIME_CONFLICT,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vehicle(id) => write!(f, "vehicle {id}"),
            Self::Driver(id) => write!(f, "driver {id}"),
        }
    }
}

/// Kind of booking holding a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    /// Vehicle reservation.
    Reservation,
    /// Driver booking.
    DriverBooking,
}

/// A booking that occupies a resource interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingRef {
    /// Booking kind.
    pub kind: BookingKind,
    /// Booking id.
    pub id: Uuid,
    /// Human-readable code.
    pub code: String,
    /// Interval start.
    pub start_at: DateTime<Utc>,
    /// Interval end (exclusive).
    pub end_at: DateTime<Utc>,
    /// Current status.
    pub status: String,
}

impl From<&Reservation> for BookingRef {
    fn from(r: &Reservation) -> Self {
        Self {
            kind: BookingKind::Reservation,
            id: r.id.as_uuid(),
            code: r.code.clone(),
            start_at: r.pickup.at,
            end_at: r.dropoff.at,
            status: r.status.to_string(),
        }
    }
}

impl From<&DriverBooking> for BookingRef {
    fn from(b: &DriverBooking) -> Self {
        Self {
            kind: BookingKind::DriverBooking,
            id: b.id.as_uuid(),
            code: b.code.clone(),
            start_at: b.start_at,
            end_at: b.end_at,
            status: b.status.to_string(),
        }
    }
}

/// Interval queries for vehicles and drivers.
#[derive(Clone)]
pub struct AvailabilityIndex {
    reservations: Arc<dyn ReservationRepository>,
    driver_bookings: Arc<dyn DriverBookingRepository>,
}

impl AvailabilityIndex {
    /// Index over the given repositories.
    #[must_use]
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        driver_bookings: Arc<dyn DriverBookingRepository>,
    ) -> Self {
        Self {
            reservations,
            driver_bookings,
        }
    }

    /// Blocking bookings of `resource` overlapping `window`, except `exclude`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn overlaps(
        &self,
        resource: Resource,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> DomainResult<Vec<BookingRef>> {
        let refs = match resource {
            Resource::Vehicle(vehicle) => self
                .reservations
                .blocking_overlaps(vehicle, window, exclude.map(ReservationId::from_uuid))
                .await?
                .iter()
                .map(BookingRef::from)
                .collect(),
            Resource::Driver(driver) => self
                .driver_bookings
                .blocking_overlaps(driver, window, exclude.map(DriverBookingId::from_uuid))
                .await?
                .iter()
                .map(BookingRef::from)
                .collect(),
        };
        Ok(refs)
    }

    /// Whether `resource` is free over `window`.
    ///
    /// # Errors
    ///
    /// Transient storage failure; never reported as free.
    pub async fn is_free(
        &self,
        resource: Resource,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> DomainResult<bool> {
        Ok(self.overlaps(resource, window, exclude).await?.is_empty())
    }

    /// Fail with the resource's conflict code when anything overlaps.
    ///
    /// # Errors
    ///
    /// `VEHICLE_TIME_CONFLICT` / `DRIVER_TIME_CONFLICT` listing the
    /// conflicting bookings, or a transient storage failure.
    pub async fn ensure_free(
        &self,
        resource: Resource,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> DomainResult<()> {
        let conflicts = self.overlaps(resource, window, exclude).await?;
        if conflicts.is_empty() {
            return Ok(());
        }
        tracing::debug!(%resource, conflicts = conflicts.len(), "Interval already booked");
        Err(DomainError::conflict(
            resource.conflict_code(),
            format!("{resource} is already booked for an overlapping interval"),
        )
        .with_details(serde_json::json!({ "conflicts": conflicts })))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use carhire_core::error::ErrorKind;
    use carhire_core::repository::DriverBookingFilter;
    use carhire_core::types::{DriverBookingStatus, DriverPricing, DriverProfileId, Currency};
    use carhire_testing::{at, fixtures};
    use rust_decimal_macros::dec;

    fn booking(n: u128, driver: UserId, start: &str, end: &str) -> DriverBooking {
        DriverBooking {
            id: DriverBookingId::from_uuid(Uuid::from_u128(n)),
            code: format!("DRV-20250301-{n:06}"),
            customer_id: fixtures::user_id(1),
            driver_id: driver,
            driver_profile_id: DriverProfileId::from_uuid(Uuid::from_u128(77)),
            pickup_location: "Airport".into(),
            dropoff_location: None,
            start_at: at(start),
            end_at: at(end),
            pricing: DriverPricing {
                currency: Currency::Usd,
                hourly_rate_snapshot: dec!(20),
                hours_requested: 4,
                estimated_total: dec!(80.00),
            },
            status: DriverBookingStatus::AcceptedByDriver,
            notes: None,
            driver_responded_at: None,
            payment_deadline_at: None,
            paid_at: None,
            payment_id: None,
            status_reason: None,
            created_at: at("2025-02-28T00:00:00Z"),
            updated_at: at("2025-02-28T00:00:00Z"),
        }
    }

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(at(start), at(end)).unwrap()
    }

    #[tokio::test]
    async fn driver_overlap_reports_conflict() {
        let store = Arc::new(MemoryStore::new());
        let driver = fixtures::user_id(2);
        DriverBookingRepository::insert(
            store.as_ref(),
            booking(1, driver, "2025-03-01T10:00:00Z", "2025-03-01T14:00:00Z"),
        )
        .await
        .unwrap();
        let index = AvailabilityIndex::new(store.clone(), store);

        let err = index
            .ensure_free(
                Resource::Driver(driver),
                window("2025-03-01T13:00:00Z", "2025-03-01T15:00:00Z"),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::DRIVER_TIME_CONFLICT);
        assert_eq!(err.details().unwrap()["conflicts"][0]["code"], "DRV-20250301-000001");
    }

    #[tokio::test]
    async fn touching_boundaries_and_exclusion_are_free() {
        let store = Arc::new(MemoryStore::new());
        let driver = fixtures::user_id(2);
        let b = booking(1, driver, "2025-03-01T10:00:00Z", "2025-03-01T14:00:00Z");
        DriverBookingRepository::insert(store.as_ref(), b.clone()).await.unwrap();
        let index = AvailabilityIndex::new(store.clone(), store);

        assert!(
            index
                .is_free(
                    Resource::Driver(driver),
                    window("2025-03-01T14:00:00Z", "2025-03-01T16:00:00Z"),
                    None
                )
                .await
                .unwrap()
        );
        assert!(
            index
                .is_free(
                    Resource::Driver(driver),
                    window("2025-03-01T11:00:00Z", "2025-03-01T12:00:00Z"),
                    Some(b.id.as_uuid())
                )
                .await
                .unwrap()
        );
        assert!(
            index
                .is_free(
                    Resource::Vehicle(VehicleId::from_uuid(Uuid::from_u128(5))),
                    window("2025-03-01T11:00:00Z", "2025-03-01T12:00:00Z"),
                    None
                )
                .await
                .unwrap()
        );
    }

    struct BrokenBookings;

    #[async_trait]
    impl DriverBookingRepository for BrokenBookings {
        async fn insert(&self, _: DriverBooking) -> DomainResult<DriverBooking> {
            Err(DomainError::storage("down"))
        }
        async fn get(&self, _: DriverBookingId) -> DomainResult<Option<DriverBooking>> {
            Err(DomainError::storage("down"))
        }
        async fn compare_and_set(
            &self,
            _: DriverBooking,
            _: DriverBookingStatus,
        ) -> DomainResult<DriverBooking> {
            Err(DomainError::storage("down"))
        }
        async fn list(&self, _: DriverBookingFilter) -> DomainResult<Vec<DriverBooking>> {
            Err(DomainError::storage("down"))
        }
        async fn blocking_overlaps(
            &self,
            _: UserId,
            _: TimeWindow,
            _: Option<DriverBookingId>,
        ) -> DomainResult<Vec<DriverBooking>> {
            Err(DomainError::storage("down"))
        }
        async fn find_expirable(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> DomainResult<Vec<DriverBooking>> {
            Err(DomainError::storage("down"))
        }
    }

    #[tokio::test]
    async fn storage_failure_fails_closed() {
        let index = AvailabilityIndex::new(Arc::new(MemoryStore::new()), Arc::new(BrokenBookings));
        let err = index
            .is_free(
                Resource::Driver(fixtures::user_id(2)),
                window("2025-03-01T10:00:00Z", "2025-03-01T11:00:00Z"),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}
