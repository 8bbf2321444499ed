//! Driver bookings: request, driver response, payment and completion.
//!
//! Every transition is checked against the table in
//! [`DriverBookingStatus::can_transition_to`] for the acting party and
//! written with compare-and-set on the status that was read.

use std::sync::Arc;

use carhire_core::broadcast::{Broadcaster, RealtimeEvent};
use carhire_core::environment::{Clock, IdGenerator};
use carhire_core::error::{DomainError, DomainResult, ErrorKind, codes};
use carhire_core::repository::{DriverBookingFilter, DriverBookingRepository, UserRepository};
use carhire_core::types::{
    BookingActor, DriverBooking, DriverBookingId, DriverBookingStatus, DriverProfile, Payment,
    PaymentStatus, PaymentTarget, Principal, PromoScope, Role, TimeWindow, User, UserId,
};
use carhire_runtime::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::code::{BookingCodeGenerator, DRIVER_PREFIX, with_fresh_code};
use super::{PayableTarget, notify_users};
use crate::availability::{AvailabilityIndex, Resource};
use crate::config::BookingConfig;
use crate::metrics;
use crate::pricing::driver_pricing;

/// A customer's request for a driver.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverBookingRequest {
    /// Requested driver (user id).
    pub driver_id: UserId,
    /// Where to meet.
    pub pickup_location: String,
    /// Where the trip ends.
    pub dropoff_location: Option<String>,
    /// Start of the engagement.
    pub start_at: DateTime<Utc>,
    /// End; defaults to `start_at + hours_requested`.
    pub end_at: Option<DateTime<Utc>>,
    /// Billed hours.
    pub hours_requested: u32,
    /// Notes for the driver.
    pub notes: Option<String>,
}

/// Listing filter.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DriverListQuery {
    /// Status filter; `awaiting_payment` matches accepted bookings.
    pub status: Option<DriverBookingStatus>,
}

/// A booking with both parties and the driver's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverBookingDetails {
    /// The booking.
    pub booking: DriverBooking,
    /// Driver account.
    pub driver: Option<User>,
    /// Driver profile.
    pub driver_profile: Option<DriverProfile>,
    /// Customer account.
    pub customer: Option<User>,
}

/// Creates and transitions driver bookings.
#[derive(Clone)]
pub struct DriverBookingCoordinator {
    bookings: Arc<dyn DriverBookingRepository>,
    users: Arc<dyn UserRepository>,
    availability: AvailabilityIndex,
    codes: Arc<BookingCodeGenerator>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    broadcaster: Arc<dyn Broadcaster>,
    config: BookingConfig,
}

fn party(actor: &Principal, booking: &DriverBooking) -> Option<BookingActor> {
    if actor.user_id == booking.customer_id {
        Some(BookingActor::Customer)
    } else if actor.user_id == booking.driver_id {
        Some(BookingActor::Driver)
    } else {
        None
    }
}

fn require(actor: &Principal, booking: &DriverBooking, who: BookingActor) -> DomainResult<()> {
    if party(actor, booking) == Some(who) {
        Ok(())
    } else {
        Err(DomainError::forbidden(match who {
            BookingActor::Customer => "only the booking's customer may do this",
            BookingActor::Driver => "only the booked driver may do this",
            BookingActor::System => "reserved for the system",
        }))
    }
}

fn clean(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

impl DriverBookingCoordinator {
    /// Coordinator over its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn DriverBookingRepository>,
        users: Arc<dyn UserRepository>,
        availability: AvailabilityIndex,
        codes: Arc<BookingCodeGenerator>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        broadcaster: Arc<dyn Broadcaster>,
        config: BookingConfig,
    ) -> Self {
        Self {
            bookings,
            users,
            availability,
            codes,
            clock,
            ids,
            broadcaster,
            config,
        }
    }

    async fn load(&self, id: DriverBookingId) -> DomainResult<DriverBooking> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("DriverBooking", id))
    }

    /// Request a driver.
    ///
    /// # Errors
    ///
    /// - `FORBIDDEN` when the caller is not a customer or books themselves
    /// - `NOT_FOUND` for an unknown driver, `DRIVER_UNAVAILABLE` when not bookable
    /// - `INVALID_TIME_WINDOW`, `DRIVER_TIME_CONFLICT`
    pub async fn request(
        &self,
        actor: &Principal,
        request: DriverBookingRequest,
    ) -> DomainResult<DriverBooking> {
        if !actor.has_role(Role::Customer) {
            return Err(DomainError::forbidden("only customers may book drivers"));
        }
        if request.driver_id == actor.user_id {
            return Err(DomainError::forbidden("drivers cannot book themselves"));
        }
        let pickup_location = request.pickup_location.trim().to_string();
        if pickup_location.is_empty() {
            return Err(DomainError::invalid_input("pickup_location is required"));
        }

        let driver = self
            .users
            .get(request.driver_id)
            .await?
            .filter(|u| u.has_role(Role::Driver))
            .ok_or_else(|| DomainError::not_found("Driver", request.driver_id))?;
        let profile = self
            .users
            .driver_profile(driver.id)
            .await?
            .ok_or_else(|| DomainError::not_found("DriverProfile", driver.id))?;
        if !driver.is_active() || !profile.is_bookable() {
            return Err(DomainError::conflict(
                codes::DRIVER_UNAVAILABLE,
                "driver is not accepting bookings",
            ));
        }

        let pricing = driver_pricing(&profile, request.hours_requested)?;
        let window = match request.end_at {
            Some(end) => TimeWindow::new(request.start_at, end)?,
            None => TimeWindow::from_hours(request.start_at, request.hours_requested)?,
        };
        self.availability
            .ensure_free(Resource::Driver(driver.id), window, None)
            .await?;

        let now = self.clock.now();
        let id = DriverBookingId::from_uuid(self.ids.next_uuid());
        let dropoff_location = clean(request.dropoff_location);
        let notes = clean(request.notes);

        let booking = with_fresh_code(&self.codes, DRIVER_PREFIX, now, |code| {
            self.bookings.insert(DriverBooking {
                id,
                code,
                customer_id: actor.user_id,
                driver_id: driver.id,
                driver_profile_id: profile.id,
                pickup_location: pickup_location.clone(),
                dropoff_location: dropoff_location.clone(),
                start_at: window.start(),
                end_at: window.end(),
                pricing: pricing.clone(),
                status: DriverBookingStatus::Requested,
                notes: notes.clone(),
                driver_responded_at: None,
                payment_deadline_at: None,
                paid_at: None,
                payment_id: None,
                status_reason: None,
                created_at: now,
                updated_at: now,
            })
        })
        .await?;

        metrics::record_driver_booking(booking.status.as_str());
        tracing::info!(
            booking_id = %booking.id,
            code = %booking.code,
            driver_id = %booking.driver_id,
            total = %booking.pricing.estimated_total,
            "Driver booking requested"
        );
        self.announce(&booking, None);
        Ok(booking)
    }

    fn announce(&self, booking: &DriverBooking, previous: Option<DriverBookingStatus>) {
        let event = RealtimeEvent::new(
            "booking:status_changed",
            json!({
                "booking_id": booking.id,
                "code": booking.code,
                "status": booking.status,
                "previous_status": previous,
                "reason": booking.status_reason,
                "payment_deadline_at": booking.payment_deadline_at,
            }),
        );
        notify_users(
            self.broadcaster.as_ref(),
            &[booking.customer_id, booking.driver_id],
            &event,
        );
    }

    async fn transition(
        &self,
        mut booking: DriverBooking,
        actor: BookingActor,
        next: DriverBookingStatus,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut DriverBooking),
    ) -> DomainResult<DriverBooking> {
        let from = booking.status;
        if !from.can_transition_to(next, actor) {
            return Err(DomainError::invalid_state(
                codes::INVALID_BOOKING_STATUS,
                format!("cannot move booking from {from} to {next}"),
            )
            .with_details(json!({ "from": from, "to": next })));
        }
        booking.status = next;
        booking.updated_at = now;
        apply(&mut booking);
        let saved = self.bookings.compare_and_set(booking, from).await?;

        metrics::record_driver_booking(saved.status.as_str());
        tracing::info!(booking_id = %saved.id, from = %from, to = %next, ?actor, "Driver booking status changed");
        self.announce(&saved, Some(from));
        Ok(saved)
    }

    /// Expire `booking` if its payment window has elapsed.
    async fn expire_if_elapsed(
        &self,
        booking: DriverBooking,
        now: DateTime<Utc>,
    ) -> DomainResult<DriverBooking> {
        if !booking.payment_window_elapsed(now) {
            return Ok(booking);
        }
        let id = booking.id;
        if let Err(e) = self
            .transition(booking, BookingActor::System, DriverBookingStatus::Expired, now, |b| {
                b.status_reason = Some("payment window elapsed".to_string());
            })
            .await
        {
            tracing::debug!(booking_id = %id, error = %e, "Lazy expiry lost a race");
        }
        Err(DomainError::invalid_state(
            codes::PAYMENT_WINDOW_EXPIRED,
            format!("payment window for booking {id} has elapsed"),
        ))
    }

    /// Driver accepts; opens the payment window.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_BOOKING_STATUS`,
    /// `DRIVER_TIME_CONFLICT`, `CONCURRENT_UPDATE`.
    pub async fn accept(&self, actor: &Principal, id: DriverBookingId) -> DomainResult<DriverBooking> {
        let booking = self.load(id).await?;
        require(actor, &booking, BookingActor::Driver)?;
        if booking.status.can_transition_to(DriverBookingStatus::AcceptedByDriver, BookingActor::Driver) {
            self.availability
                .ensure_free(
                    Resource::Driver(booking.driver_id),
                    booking.window()?,
                    Some(id.as_uuid()),
                )
                .await?;
        }
        let now = self.clock.now();
        let deadline = now + self.config.payment_window();
        self.transition(
            booking,
            BookingActor::Driver,
            DriverBookingStatus::AcceptedByDriver,
            now,
            |b| {
                b.driver_responded_at = Some(now);
                b.payment_deadline_at = Some(deadline);
            },
        )
        .await
    }

    /// Driver declines.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_BOOKING_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn decline(
        &self,
        actor: &Principal,
        id: DriverBookingId,
        reason: Option<String>,
    ) -> DomainResult<DriverBooking> {
        let booking = self.load(id).await?;
        require(actor, &booking, BookingActor::Driver)?;
        let now = self.clock.now();
        self.transition(
            booking,
            BookingActor::Driver,
            DriverBookingStatus::DeclinedByDriver,
            now,
            |b| {
                b.driver_responded_at = Some(now);
                b.status_reason = clean(reason);
            },
        )
        .await
    }

    /// Customer cancels a requested or accepted booking.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_BOOKING_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn cancel_by_customer(
        &self,
        actor: &Principal,
        id: DriverBookingId,
        reason: Option<String>,
    ) -> DomainResult<DriverBooking> {
        let booking = self.load(id).await?;
        require(actor, &booking, BookingActor::Customer)?;
        self.transition(
            booking,
            BookingActor::Customer,
            DriverBookingStatus::CancelledByCustomer,
            self.clock.now(),
            |b| b.status_reason = clean(reason),
        )
        .await
    }

    /// Driver cancels a requested or accepted booking.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_BOOKING_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn cancel_by_driver(
        &self,
        actor: &Principal,
        id: DriverBookingId,
        reason: Option<String>,
    ) -> DomainResult<DriverBooking> {
        let booking = self.load(id).await?;
        require(actor, &booking, BookingActor::Driver)?;
        self.transition(
            booking,
            BookingActor::Driver,
            DriverBookingStatus::CancelledByDriver,
            self.clock.now(),
            |b| b.status_reason = clean(reason),
        )
        .await
    }

    /// Driver marks a confirmed trip done.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_BOOKING_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn complete(&self, actor: &Principal, id: DriverBookingId) -> DomainResult<DriverBooking> {
        let booking = self.load(id).await?;
        require(actor, &booking, BookingActor::Driver)?;
        self.transition(
            booking,
            BookingActor::Driver,
            DriverBookingStatus::Completed,
            self.clock.now(),
            |_| {},
        )
        .await
    }

    async fn try_confirm(&self, id: DriverBookingId, payment: &Payment) -> DomainResult<DriverBooking> {
        let booking = self.load(id).await?;
        if booking.payment_id == Some(payment.id) && booking.status == DriverBookingStatus::Confirmed {
            return Ok(booking);
        }
        let now = self.clock.now();
        let booking = self.expire_if_elapsed(booking, now).await?;
        let paid_at = payment.captured_at.unwrap_or(now);
        self.transition(
            booking,
            BookingActor::System,
            DriverBookingStatus::Confirmed,
            now,
            |b| {
                b.paid_at = Some(paid_at);
                b.payment_id = Some(payment.id);
            },
        )
        .await
    }

    /// Confirm an accepted booking with a captured payment.
    ///
    /// Idempotent per payment. An elapsed payment window expires the
    /// booking instead.
    ///
    /// # Errors
    ///
    /// - `INVALID_PAYMENT_STATUS` when `payment` is not paid
    /// - `PAYMENT_WINDOW_EXPIRED`, `INVALID_BOOKING_STATUS`
    /// - `CONCURRENT_UPDATE` after retries
    pub async fn confirm_payment(
        &self,
        id: DriverBookingId,
        payment: &Payment,
    ) -> DomainResult<DriverBooking> {
        if payment.status != PaymentStatus::Paid {
            return Err(DomainError::invalid_state(
                codes::INVALID_PAYMENT_STATUS,
                format!("payment {} is {}, not paid", payment.id, payment.status),
            ));
        }
        retry_with_predicate(
            &RetryPolicy::compare_and_set(),
            || self.try_confirm(id, payment),
            |e: &DomainError| e.code() == codes::CONCURRENT_UPDATE,
        )
        .await
    }

    /// Check that `actor` may pay for booking `id` now.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`, `PAYMENT_WINDOW_EXPIRED`,
    /// `INVALID_BOOKING_STATUS`.
    pub async fn ensure_payable(
        &self,
        actor: &Principal,
        id: DriverBookingId,
    ) -> DomainResult<PayableTarget> {
        let booking = self.load(id).await?;
        if booking.customer_id != actor.user_id && !actor.is_staff() {
            return Err(DomainError::forbidden("not your booking"));
        }
        let booking = self.expire_if_elapsed(booking, self.clock.now()).await?;
        if !booking.status.awaits_payment() {
            return Err(DomainError::invalid_state(
                codes::INVALID_BOOKING_STATUS,
                format!("booking is {}, not awaiting payment", booking.status),
            ));
        }
        Ok(PayableTarget {
            target: PaymentTarget::DriverBooking(id),
            customer_id: booking.customer_id,
            currency: booking.pricing.currency,
            scope: PromoScope::DriverBooking,
            description: format!("Driver booking {}", booking.code),
        })
    }

    /// Expire accepted bookings past their deadline and requests older than
    /// the request TTL. Returns how many were expired.
    ///
    /// # Errors
    ///
    /// Transient storage failure while listing.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let candidates = self
            .bookings
            .find_expirable(now, now - self.config.driver_request_ttl())
            .await?;
        let mut expired = 0;
        for booking in candidates {
            let id = booking.id;
            match self
                .transition(booking, BookingActor::System, DriverBookingStatus::Expired, now, |b| {
                    b.status_reason = Some("payment window or request TTL elapsed".to_string());
                })
                .await
            {
                Ok(_) => expired += 1,
                Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::InvalidState) => {
                    tracing::debug!(booking_id = %id, error = %e, "Booking moved on before expiry");
                }
                Err(e) => tracing::error!(booking_id = %id, error = %e, "Failed to expire booking"),
            }
        }
        Ok(expired)
    }

    /// Booking with both parties, for a party or staff.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`.
    pub async fn details(
        &self,
        actor: &Principal,
        id: DriverBookingId,
    ) -> DomainResult<DriverBookingDetails> {
        let booking = self.load(id).await?;
        if party(actor, &booking).is_none() && !actor.is_staff() {
            return Err(DomainError::forbidden("not a party to this booking"));
        }
        let (driver, driver_profile, customer) = futures::try_join!(
            self.users.get(booking.driver_id),
            self.users.driver_profile(booking.driver_id),
            self.users.get(booking.customer_id),
        )?;
        Ok(DriverBookingDetails {
            booking,
            driver,
            driver_profile,
            customer,
        })
    }

    /// The caller's bookings as customer.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn list_for_customer(
        &self,
        actor: &Principal,
        query: DriverListQuery,
    ) -> DomainResult<Vec<DriverBooking>> {
        self.bookings
            .list(DriverBookingFilter {
                customer_id: Some(actor.user_id),
                driver_id: None,
                status: query.status,
            })
            .await
    }

    /// The caller's bookings as driver.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` for non-drivers, transient storage failure.
    pub async fn list_for_driver(
        &self,
        actor: &Principal,
        query: DriverListQuery,
    ) -> DomainResult<Vec<DriverBooking>> {
        if !actor.has_role(Role::Driver) {
            return Err(DomainError::forbidden("driver role required"));
        }
        self.bookings
            .list(DriverBookingFilter {
                customer_id: None,
                driver_id: Some(actor.user_id),
                status: query.status,
            })
            .await
    }

    /// Every booking, for managers and admins.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, transient storage failure.
    pub async fn list_all(
        &self,
        actor: &Principal,
        query: DriverListQuery,
    ) -> DomainResult<Vec<DriverBooking>> {
        if !actor.is_manager_or_admin() {
            return Err(DomainError::forbidden("manager or admin role required"));
        }
        self.bookings
            .list(DriverBookingFilter {
                status: query.status,
                ..DriverBookingFilter::default()
            })
            .await
    }
}
