use super::ids::{DriverBookingId, DriverProfileId, PaymentId, UserId};
use super::money::Currency;
use super::time::TimeWindow;
use crate::error::DomainResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Driver booking lifecycle.
///
/// `AwaitingPayment` is accepted on input and treated exactly like
/// `AcceptedByDriver`; the coordinator never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverBookingStatus {
    /// Waiting for the driver.
    Requested,
    /// Driver accepted; payment window open.
    AcceptedByDriver,
    /// Alias of `AcceptedByDriver`.
    AwaitingPayment,
    /// Paid.
    Confirmed,
    /// Driver declined.
    DeclinedByDriver,
    /// Customer cancelled.
    CancelledByCustomer,
    /// Driver cancelled.
    CancelledByDriver,
    /// Payment window or request TTL elapsed.
    Expired,
    /// Trip finished.
    Completed,
}

/// Who attempts a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingActor {
    /// The booking's customer.
    Customer,
    /// The booked driver.
    Driver,
    /// Sweepers and payment capture.
    System,
}

impl DriverBookingStatus {
    /// Collapse the `AwaitingPayment` alias.
    #[must_use]
    pub const fn normalized(self) -> Self {
        match self {
            Self::AwaitingPayment => Self::AcceptedByDriver,
            other => other,
        }
    }

    /// Statuses that reserve the driver's interval.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(
            self.normalized(),
            Self::Requested | Self::AcceptedByDriver | Self::Confirmed
        )
    }

    /// No further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::DeclinedByDriver
                | Self::CancelledByCustomer
                | Self::CancelledByDriver
                | Self::Expired
                | Self::Completed
        )
    }

    /// Waiting for the customer's payment.
    #[must_use]
    pub const fn awaits_payment(self) -> bool {
        matches!(self.normalized(), Self::AcceptedByDriver)
    }

    /// Transition table, keyed by actor.
    #[must_use]
    pub const fn can_transition_to(self, next: Self, actor: BookingActor) -> bool {
        use BookingActor::{Customer, Driver, System};
        matches!(
            (self.normalized(), next.normalized(), actor),
            (Self::Requested, Self::AcceptedByDriver | Self::DeclinedByDriver, Driver)
                | (Self::AcceptedByDriver, Self::Confirmed, Customer | System)
                | (Self::Requested | Self::AcceptedByDriver, Self::Expired, System)
                | (Self::Requested | Self::AcceptedByDriver, Self::CancelledByCustomer, Customer)
                | (Self::Requested | Self::AcceptedByDriver, Self::CancelledByDriver, Driver)
                | (Self::Confirmed, Self::Completed, Driver)
        )
    }

    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::AcceptedByDriver => "accepted_by_driver",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Confirmed => "confirmed",
            Self::DeclinedByDriver => "declined_by_driver",
            Self::CancelledByCustomer => "cancelled_by_customer",
            Self::CancelledByDriver => "cancelled_by_driver",
            Self::Expired => "expired",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for DriverBookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable price snapshot taken at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverPricing {
    /// Currency.
    pub currency: Currency,
    /// Driver's hourly rate when requested.
    pub hourly_rate_snapshot: Decimal,
    /// Requested hours, strictly positive.
    pub hours_requested: u32,
    /// `hourly_rate_snapshot * hours_requested`, two decimal places.
    pub estimated_total: Decimal,
}

/// A rental of a driver's time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverBooking {
    /// Identifier.
    pub id: DriverBookingId,
    /// Unique `DRV-` code.
    pub code: String,
    /// Booking customer.
    pub customer_id: UserId,
    /// Booked driver.
    pub driver_id: UserId,
    /// Driver's profile.
    pub driver_profile_id: DriverProfileId,
    /// Free-form pickup location.
    pub pickup_location: String,
    /// Free-form dropoff location.
    pub dropoff_location: Option<String>,
    /// Start of the engagement.
    pub start_at: DateTime<Utc>,
    /// End of the engagement, always materialised.
    pub end_at: DateTime<Utc>,
    /// Price snapshot.
    pub pricing: DriverPricing,
    /// Lifecycle status.
    pub status: DriverBookingStatus,
    /// Customer notes.
    pub notes: Option<String>,
    /// When the driver accepted or declined.
    pub driver_responded_at: Option<DateTime<Utc>>,
    /// Deadline for payment after acceptance.
    pub payment_deadline_at: Option<DateTime<Utc>>,
    /// Capture time.
    pub paid_at: Option<DateTime<Utc>>,
    /// Capturing payment.
    pub payment_id: Option<PaymentId>,
    /// Reason given on cancel or decline.
    pub status_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl DriverBooking {
    /// `[start_at, end_at)`.
    ///
    /// # Errors
    ///
    /// `INVALID_TIME_WINDOW` if the stored times are inverted.
    pub fn window(&self) -> DomainResult<TimeWindow> {
        TimeWindow::new(self.start_at, self.end_at)
    }

    /// Accepted and the payment deadline has passed.
    #[must_use]
    pub fn payment_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status.awaits_payment() && self.payment_deadline_at.is_some_and(|d| now > d)
    }
}
