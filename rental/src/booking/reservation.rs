//! Vehicle reservations.

use std::sync::Arc;

use carhire_core::broadcast::{Broadcaster, RealtimeEvent};
use carhire_core::environment::{Clock, IdGenerator};
use carhire_core::error::{DomainError, DomainResult, codes};
use carhire_core::repository::{ReservationFilter, ReservationRepository};
use carhire_core::types::{
    Currency, Payment, PaymentStatus, PaymentSummary, PaymentTarget, Place, Principal,
    PromoScope, Reservation, ReservationId, ReservationStatus, Role, TimeWindow, UserId, VehicleId,
    VehicleModelId,
};
use carhire_runtime::{RetryPolicy, retry_with_predicate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::code::{BookingCodeGenerator, RESERVATION_PREFIX, with_fresh_code};
use super::{PayableTarget, notify_users};
use crate::availability::{AvailabilityIndex, BookingRef, Resource};
use crate::metrics;
use crate::pricing::reservation_pricing;

/// Reservation request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReservation {
    /// Customer; staff must set it, customers may only name themselves.
    pub customer_id: Option<UserId>,
    /// Requested model.
    pub vehicle_model_id: VehicleModelId,
    /// Specific unit, when already allocated.
    pub vehicle_id: Option<VehicleId>,
    /// Pickup branch and time.
    pub pickup: Place,
    /// Dropoff branch and time.
    pub dropoff: Place,
    /// Daily rate of the model.
    pub daily_rate: Decimal,
    /// Rate currency.
    pub currency: Currency,
    /// Flat fees.
    pub fees: Option<Decimal>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Listing filter as accepted from callers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationListQuery {
    /// Status filter.
    pub status: Option<ReservationStatus>,
    /// Customer filter (staff only).
    pub customer_id: Option<UserId>,
    /// Vehicle filter.
    pub vehicle_id: Option<VehicleId>,
}

/// Answer to an availability query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    /// Queried vehicle.
    pub vehicle_id: VehicleId,
    /// Nothing blocks the window.
    pub available: bool,
    /// Blocking reservations.
    pub conflicts: Vec<BookingRef>,
}

/// Creates and transitions reservations.
#[derive(Clone)]
pub struct ReservationCoordinator {
    reservations: Arc<dyn ReservationRepository>,
    availability: AvailabilityIndex,
    codes: Arc<BookingCodeGenerator>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    broadcaster: Arc<dyn Broadcaster>,
}

fn is_lost_race(err: &DomainError) -> bool {
    err.code() == codes::CONCURRENT_UPDATE
}

fn can_view(actor: &Principal, reservation: &Reservation) -> bool {
    actor.is_staff() || reservation.customer_id == actor.user_id
}

impl ReservationCoordinator {
    /// Coordinator over its collaborators.
    #[must_use]
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        availability: AvailabilityIndex,
        codes: Arc<BookingCodeGenerator>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            reservations,
            availability,
            codes,
            clock,
            ids,
            broadcaster,
        }
    }

    async fn load(&self, id: ReservationId) -> DomainResult<Reservation> {
        self.reservations
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Reservation", id))
    }

    fn announce(&self, reservation: &Reservation, previous: ReservationStatus) {
        metrics::record_reservation(reservation.status.as_str());
        let event = RealtimeEvent::new(
            "reservation:status_changed",
            json!({
                "reservation_id": reservation.id,
                "code": reservation.code,
                "status": reservation.status,
                "previous_status": previous,
            }),
        );
        notify_users(self.broadcaster.as_ref(), &[reservation.customer_id], &event);
    }

    /// Create a pending reservation.
    ///
    /// # Errors
    ///
    /// - `FORBIDDEN` when a customer books for someone else or the caller is neither customer nor staff
    /// - `INVALID_TIME_WINDOW`, `INVALID_AMOUNT`
    /// - `VEHICLE_TIME_CONFLICT` when the assigned vehicle is taken
    pub async fn create(
        &self,
        actor: &Principal,
        request: NewReservation,
    ) -> DomainResult<Reservation> {
        let customer_id = if actor.is_staff() {
            request.customer_id.ok_or_else(|| {
                DomainError::invalid_input("customer_id is required when booking on behalf")
            })?
        } else if actor.has_role(Role::Customer) {
            match request.customer_id {
                Some(other) if other != actor.user_id => {
                    return Err(DomainError::forbidden(
                        "customers may only reserve for themselves",
                    ));
                }
                _ => actor.user_id,
            }
        } else {
            return Err(DomainError::forbidden("only customers or staff may reserve"));
        };

        let window = TimeWindow::new(request.pickup.at, request.dropoff.at)?;
        let pricing = reservation_pricing(
            request.daily_rate,
            request.currency,
            &window,
            request.fees.unwrap_or_default(),
        )?;
        if let Some(vehicle) = request.vehicle_id {
            self.availability
                .ensure_free(Resource::Vehicle(vehicle), window, None)
                .await?;
        }

        let now = self.clock.now();
        let id = ReservationId::from_uuid(self.ids.next_uuid());
        let notes = request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        let reservation = with_fresh_code(&self.codes, RESERVATION_PREFIX, now, |code| {
            self.reservations.insert(Reservation {
                id,
                code,
                customer_id,
                created_by: actor.user_id,
                vehicle_model_id: request.vehicle_model_id,
                vehicle_id: request.vehicle_id,
                pickup: request.pickup,
                dropoff: request.dropoff,
                pricing: pricing.clone(),
                status: ReservationStatus::Pending,
                payment: None,
                notes: notes.clone(),
                created_at: now,
                updated_at: now,
            })
        })
        .await?;

        metrics::record_reservation(reservation.status.as_str());
        tracing::info!(
            reservation_id = %reservation.id,
            code = %reservation.code,
            customer_id = %customer_id,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Fetch a reservation the caller may see.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`.
    pub async fn get(&self, actor: &Principal, id: ReservationId) -> DomainResult<Reservation> {
        let reservation = self.load(id).await?;
        if !can_view(actor, &reservation) {
            return Err(DomainError::forbidden("not your reservation"));
        }
        Ok(reservation)
    }

    /// List reservations; non-staff callers only see their own.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn list(
        &self,
        actor: &Principal,
        query: ReservationListQuery,
    ) -> DomainResult<Vec<Reservation>> {
        let customer_id = if actor.is_staff() {
            query.customer_id
        } else {
            Some(actor.user_id)
        };
        self.reservations
            .list(ReservationFilter {
                customer_id,
                vehicle_id: query.vehicle_id,
                status: query.status,
            })
            .await
    }

    /// Whether `vehicle` is free over `window`.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn check_availability(
        &self,
        vehicle: VehicleId,
        window: TimeWindow,
        exclude: Option<ReservationId>,
    ) -> DomainResult<AvailabilityReport> {
        let conflicts = self
            .availability
            .overlaps(
                Resource::Vehicle(vehicle),
                window,
                exclude.map(|id| id.as_uuid()),
            )
            .await?;
        Ok(AvailabilityReport {
            vehicle_id: vehicle,
            available: conflicts.is_empty(),
            conflicts,
        })
    }

    async fn transition(
        &self,
        mut reservation: Reservation,
        next: ReservationStatus,
    ) -> DomainResult<Reservation> {
        let from = reservation.status;
        if !from.can_transition_to(next) {
            return Err(DomainError::invalid_state(
                codes::INVALID_RESERVATION_STATUS,
                format!("cannot move reservation from {from} to {next}"),
            )
            .with_details(json!({ "from": from, "to": next })));
        }
        reservation.status = next;
        reservation.updated_at = self.clock.now();
        let saved = self.reservations.compare_and_set(reservation, from).await?;
        tracing::info!(reservation_id = %saved.id, from = %from, to = %next, "Reservation status changed");
        self.announce(&saved, from);
        Ok(saved)
    }

    /// Staff status change.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_RESERVATION_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn update_status(
        &self,
        actor: &Principal,
        id: ReservationId,
        next: ReservationStatus,
    ) -> DomainResult<Reservation> {
        if !actor.is_staff() {
            return Err(DomainError::forbidden("only staff may change reservation status"));
        }
        let reservation = self.load(id).await?;
        self.transition(reservation, next).await
    }

    /// Cancel a pending or confirmed reservation.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_RESERVATION_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn cancel(&self, actor: &Principal, id: ReservationId) -> DomainResult<Reservation> {
        let reservation = self.load(id).await?;
        if !can_view(actor, &reservation) {
            return Err(DomainError::forbidden("not your reservation"));
        }
        if !matches!(
            reservation.status,
            ReservationStatus::Pending | ReservationStatus::Confirmed
        ) {
            return Err(DomainError::invalid_state(
                codes::INVALID_RESERVATION_STATUS,
                format!("cannot cancel a {} reservation", reservation.status),
            ));
        }
        self.transition(reservation, ReservationStatus::Cancelled).await
    }

    /// Allocate a vehicle unit.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_RESERVATION_STATUS`,
    /// `VEHICLE_TIME_CONFLICT`, `CONCURRENT_UPDATE`.
    pub async fn assign_vehicle(
        &self,
        actor: &Principal,
        id: ReservationId,
        vehicle: VehicleId,
    ) -> DomainResult<Reservation> {
        if !actor.is_staff() {
            return Err(DomainError::forbidden("only staff may assign vehicles"));
        }
        let mut reservation = self.load(id).await?;
        let status = reservation.status;
        if !matches!(status, ReservationStatus::Pending | ReservationStatus::Confirmed) {
            return Err(DomainError::invalid_state(
                codes::INVALID_RESERVATION_STATUS,
                format!("cannot assign a vehicle to a {status} reservation"),
            ));
        }
        self.availability
            .ensure_free(
                Resource::Vehicle(vehicle),
                reservation.window()?,
                Some(id.as_uuid()),
            )
            .await?;
        reservation.vehicle_id = Some(vehicle);
        reservation.updated_at = self.clock.now();
        let saved = self.reservations.compare_and_set(reservation, status).await?;
        tracing::info!(reservation_id = %id, vehicle_id = %vehicle, "Vehicle assigned");
        Ok(saved)
    }

    /// Check that `actor` may pay for reservation `id` now.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`, `INVALID_RESERVATION_STATUS`.
    pub async fn ensure_payable(
        &self,
        actor: &Principal,
        id: ReservationId,
    ) -> DomainResult<PayableTarget> {
        let reservation = self.load(id).await?;
        if !can_view(actor, &reservation) {
            return Err(DomainError::forbidden("not your reservation"));
        }
        if reservation.status != ReservationStatus::Pending {
            return Err(DomainError::invalid_state(
                codes::INVALID_RESERVATION_STATUS,
                format!("reservation is {}, not awaiting payment", reservation.status),
            ));
        }
        Ok(PayableTarget {
            target: PaymentTarget::Reservation(id),
            customer_id: reservation.customer_id,
            currency: reservation.pricing.currency,
            scope: PromoScope::Reservation,
            description: format!("Reservation {}", reservation.code),
        })
    }

    async fn try_capture(&self, id: ReservationId, payment: &Payment) -> DomainResult<Reservation> {
        let mut reservation = self.load(id).await?;
        if reservation
            .payment
            .as_ref()
            .is_some_and(|p| p.payment_id == payment.id)
        {
            return Ok(reservation);
        }
        let from = reservation.status;
        match from {
            ReservationStatus::Pending => reservation.status = ReservationStatus::Confirmed,
            ReservationStatus::Confirmed => {}
            other => {
                return Err(DomainError::invalid_state(
                    codes::INVALID_RESERVATION_STATUS,
                    format!("payment captured for a {other} reservation"),
                ));
            }
        }
        reservation.payment = Some(PaymentSummary {
            payment_id: payment.id,
            status: PaymentStatus::Paid,
            amount_paid: payment.captured_amount.unwrap_or(payment.amount),
            paid_at: payment.captured_at,
        });
        reservation.updated_at = self.clock.now();
        let saved = self.reservations.compare_and_set(reservation, from).await?;
        if saved.status != from {
            self.announce(&saved, from);
        }
        Ok(saved)
    }

    /// Record a captured payment: pending becomes confirmed.
    ///
    /// Idempotent per payment. Lost races are retried.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `INVALID_RESERVATION_STATUS`, or `CONCURRENT_UPDATE`
    /// after the retries.
    pub async fn record_payment_captured(
        &self,
        id: ReservationId,
        payment: &Payment,
    ) -> DomainResult<Reservation> {
        retry_with_predicate(
            &RetryPolicy::compare_and_set(),
            || self.try_capture(id, payment),
            is_lost_race,
        )
        .await
    }
}
