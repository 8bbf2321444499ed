//! Booking coordinator: reservations and driver bookings.
//!
//! Both coordinators follow the same shape. A transition loads the entity,
//! checks the caller and the transition table, then writes with
//! compare-and-set on the status it read. A lost race surfaces as
//! `CONCURRENT_UPDATE`; overlaps as `VEHICLE_TIME_CONFLICT` or
//! `DRIVER_TIME_CONFLICT`.

pub mod code;
pub mod driver;
pub mod reservation;

use async_trait::async_trait;
use carhire_core::broadcast::{Broadcaster, Namespace, RealtimeEvent, rooms};
use carhire_core::error::DomainResult;
use carhire_core::types::{Currency, Payment, PaymentTarget, Principal, PromoScope, UserId};

pub use code::BookingCodeGenerator;
pub use driver::{
    DriverBookingCoordinator, DriverBookingDetails, DriverBookingRequest, DriverListQuery,
};
pub use reservation::{NewReservation, ReservationCoordinator, ReservationListQuery};

/// What a payment settles, as resolved by the booking side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayableTarget {
    /// The booking.
    pub target: PaymentTarget,
    /// Booking customer.
    pub customer_id: UserId,
    /// Booking currency.
    pub currency: Currency,
    /// Promo scope of the booking.
    pub scope: PromoScope,
    /// Line shown to the payer.
    pub description: String,
}

/// The booking side as seen by the payment orchestrator.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Resolve `target` and check that `actor` may pay for it now.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`, or an invalid-state error when the booking
    /// is not awaiting payment.
    async fn prepare_payment(
        &self,
        actor: &Principal,
        target: PaymentTarget,
    ) -> DomainResult<PayableTarget>;

    /// `payment` reached `paid`: move its booking to the confirmed state.
    ///
    /// # Errors
    ///
    /// Invalid state when the booking can no longer be confirmed.
    async fn payment_captured(&self, payment: &Payment) -> DomainResult<()>;
}

/// Both coordinators behind the ledger seam.
#[derive(Clone)]
pub struct Bookings {
    /// Reservations.
    pub reservations: ReservationCoordinator,
    /// Driver bookings.
    pub drivers: DriverBookingCoordinator,
}

#[async_trait]
impl BookingLedger for Bookings {
    async fn prepare_payment(
        &self,
        actor: &Principal,
        target: PaymentTarget,
    ) -> DomainResult<PayableTarget> {
        match target {
            PaymentTarget::Reservation(id) => self.reservations.ensure_payable(actor, id).await,
            PaymentTarget::DriverBooking(id) => self.drivers.ensure_payable(actor, id).await,
        }
    }

    async fn payment_captured(&self, payment: &Payment) -> DomainResult<()> {
        match payment.target {
            PaymentTarget::Reservation(id) => {
                self.reservations.record_payment_captured(id, payment).await?;
            }
            PaymentTarget::DriverBooking(id) => {
                self.drivers.confirm_payment(id, payment).await?;
            }
        }
        Ok(())
    }
}

/// Publish `event` to the personal rooms of `users`.
pub(crate) fn notify_users(
    broadcaster: &dyn Broadcaster,
    users: &[UserId],
    event: &RealtimeEvent,
) {
    for user in users {
        broadcaster.publish(Namespace::Chat, &rooms::user(*user), event.clone(), None);
    }
}
