use super::ids::{BranchId, PaymentId, ReservationId, UserId, VehicleId, VehicleModelId};
use super::money::Currency;
use super::payment::PaymentStatus;
use super::time::TimeWindow;
use crate::error::DomainResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reservation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Created, awaiting payment or staff confirmation.
    Pending,
    /// Paid or confirmed by staff.
    Confirmed,
    /// Vehicle handed over.
    CheckedOut,
    /// Vehicle returned.
    Returned,
    /// Cancelled before return.
    Cancelled,
    /// Customer never showed up.
    NoShow,
}

impl ReservationStatus {
    /// Statuses that reserve the assigned vehicle's interval.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::CheckedOut)
    }

    /// No further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Returned | Self::Cancelled | Self::NoShow)
    }

    /// Legal staff transitions.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled | Self::NoShow)
                | (Self::Confirmed, Self::CheckedOut | Self::Cancelled | Self::NoShow)
                | (Self::CheckedOut, Self::Returned | Self::Cancelled)
        )
    }
}

impl ReservationStatus {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::CheckedOut => "checked_out",
            Self::Returned => "returned",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A branch and a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    /// Branch.
    pub branch_id: BranchId,
    /// Moment of pickup or dropoff.
    pub at: DateTime<Utc>,
}

/// Price captured when the reservation was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPricing {
    /// Currency.
    pub currency: Currency,
    /// Rate per started day.
    pub daily_rate: Decimal,
    /// Billed days.
    pub days: u32,
    /// `daily_rate * days`.
    pub subtotal: Decimal,
    /// Flat fees.
    pub fees: Decimal,
    /// `subtotal + fees`.
    pub total: Decimal,
}

/// Payment information denormalised onto the reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    /// Capturing payment.
    pub payment_id: PaymentId,
    /// Payment status at the time of the update.
    pub status: PaymentStatus,
    /// Captured amount.
    pub amount_paid: Decimal,
    /// Capture time.
    pub paid_at: Option<DateTime<Utc>>,
}

/// A rental intent for a vehicle model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Identifier.
    pub id: ReservationId,
    /// Unique human-readable code.
    pub code: String,
    /// Renting customer.
    pub customer_id: UserId,
    /// Who created it (the customer or staff on their behalf).
    pub created_by: UserId,
    /// Requested model.
    pub vehicle_model_id: VehicleModelId,
    /// Allocated unit, if any.
    pub vehicle_id: Option<VehicleId>,
    /// Pickup branch and time.
    pub pickup: Place,
    /// Dropoff branch and time.
    pub dropoff: Place,
    /// Price snapshot.
    pub pricing: ReservationPricing,
    /// Lifecycle status.
    pub status: ReservationStatus,
    /// Payment summary once captured.
    pub payment: Option<PaymentSummary>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// `[pickup, dropoff)`.
    ///
    /// # Errors
    ///
    /// `INVALID_TIME_WINDOW` if the stored times are inverted.
    pub fn window(&self) -> DomainResult<TimeWindow> {
        TimeWindow::new(self.pickup.at, self.dropoff.at)
    }

    /// Reserves its vehicle: blocking status and a vehicle assigned.
    #[must_use]
    pub const fn blocks_vehicle(&self) -> bool {
        self.status.is_blocking() && self.vehicle_id.is_some()
    }
}
