use super::ids::{DriverBookingId, PaymentId, PromoCodeId, ReservationId, UserId};
use super::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created locally or at the gateway.
    Pending,
    /// Gateway sent the request to the payer.
    Sent,
    /// Payer acted, gateway confirming.
    AwaitingConfirmation,
    /// Paid, goods awaiting delivery (gateway escrow).
    AwaitingDelivery,
    /// Captured.
    Paid,
    /// Rejected by the gateway.
    Failed,
    /// Cancelled by payer or locally.
    Cancelled,
    /// Fully refunded.
    Refunded,
    /// Invalidated.
    Void,
}

impl PaymentStatus {
    /// Sticky statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Failed | Self::Cancelled | Self::Refunded | Self::Void
        )
    }

    /// Statuses that hold the target's single active slot.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::AwaitingConfirmation => 2,
            Self::AwaitingDelivery => 3,
            Self::Paid | Self::Failed | Self::Cancelled | Self::Refunded | Self::Void => 4,
        }
    }

    /// Forward-only progression; terminal statuses never change here.
    ///
    /// `Refunded` is reached only through the refund path, never by reconciliation.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() || matches!(next, Self::Refunded) {
            return false;
        }
        next.rank() > self.rank()
    }

    /// Map gateway status text to a canonical status.
    ///
    /// Case-insensitive substring match, first rule wins. Text containing
    /// "unpaid" maps to `Pending` before the "paid" rule can see it.
    ///
    /// ```
    /// use carhire_core::types::PaymentStatus;
    ///
    /// assert_eq!(PaymentStatus::from_provider_text("Paid"), PaymentStatus::Paid);
    /// assert_eq!(PaymentStatus::from_provider_text("Awaiting Delivery"), PaymentStatus::AwaitingDelivery);
    /// assert_eq!(PaymentStatus::from_provider_text("Created"), PaymentStatus::Sent);
    /// assert_eq!(PaymentStatus::from_provider_text("Disputed"), PaymentStatus::Pending);
    /// ```
    #[must_use]
    pub fn from_provider_text(text: &str) -> Self {
        let t = text.trim().to_ascii_lowercase();
        // "unpaid" contains "paid"
        if t.contains("unpaid") {
            Self::Pending
        } else if t.contains("paid") {
            Self::Paid
        } else if t.contains("awaiting delivery") {
            Self::AwaitingDelivery
        } else if t.contains("awaiting confirmation") {
            Self::AwaitingConfirmation
        } else if t.contains("sent") || t.contains("created") {
            Self::Sent
        } else if t.contains("cancel") {
            Self::Cancelled
        } else if t.contains("fail") {
            Self::Failed
        } else {
            Self::Pending
        }
    }

    /// Snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::AwaitingDelivery => "awaiting_delivery",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single booking a payment settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PaymentTarget {
    /// A vehicle reservation.
    Reservation(ReservationId),
    /// A driver booking.
    DriverBooking(DriverBookingId),
}

impl PaymentTarget {
    /// Resolve the exactly-one rule from two optional ids.
    #[must_use]
    pub const fn from_parts(
        reservation_id: Option<ReservationId>,
        driver_booking_id: Option<DriverBookingId>,
    ) -> Option<Self> {
        match (reservation_id, driver_booking_id) {
            (Some(r), None) => Some(Self::Reservation(r)),
            (None, Some(d)) => Some(Self::DriverBooking(d)),
            _ => None,
        }
    }

    /// Reservation id when targeting a reservation.
    #[must_use]
    pub const fn reservation_id(&self) -> Option<ReservationId> {
        match self {
            Self::Reservation(id) => Some(*id),
            Self::DriverBooking(_) => None,
        }
    }

    /// Driver booking id when targeting a driver booking.
    #[must_use]
    pub const fn driver_booking_id(&self) -> Option<DriverBookingId> {
        match self {
            Self::DriverBooking(id) => Some(*id),
            Self::Reservation(_) => None,
        }
    }
}

impl fmt::Display for PaymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reservation(id) => write!(f, "reservation:{id}"),
            Self::DriverBooking(id) => write!(f, "driver_booking:{id}"),
        }
    }
}

/// Payment instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card via redirect.
    Card,
    /// Mobile wallet (push to phone).
    Wallet,
    /// Bank transfer via redirect.
    Bank,
    /// Cash at the counter.
    Cash,
}

impl PaymentMethod {
    /// Uses the mobile (no redirect) gateway flow.
    #[must_use]
    pub const fn is_mobile(self) -> bool {
        matches!(self, Self::Wallet)
    }
}

/// Who settles the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// External Paynow gateway.
    Paynow,
    /// Counter cash, confirmed by staff.
    Manual,
}

/// Promo applied to a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoSnapshot {
    /// Promo id.
    pub promo_id: PromoCodeId,
    /// Normalised code.
    pub code: String,
    /// Discount taken off the base amount.
    pub discount: Decimal,
}

/// Append-only refund record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    /// Refunded amount.
    pub amount: Decimal,
    /// Gateway reference, when refunded externally.
    pub provider_ref: Option<String>,
    /// Reason.
    pub reason: Option<String>,
    /// Time recorded.
    pub at: DateTime<Utc>,
}

/// Outcome of applying a reconciled status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Status kept; the update was stale, equal or targeted a terminal payment.
    Unchanged,
    /// Status moved forward.
    Advanced {
        /// Previous status.
        from: PaymentStatus,
        /// New status.
        to: PaymentStatus,
    },
}

/// A payment attempt bound to one booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Identifier.
    pub id: PaymentId,
    /// Settled booking.
    pub target: PaymentTarget,
    /// Initiating user.
    pub payer_id: UserId,
    /// Settlement provider.
    pub provider: PaymentProvider,
    /// Instrument.
    pub method: PaymentMethod,
    /// Payable amount after discount.
    pub amount: Decimal,
    /// Currency.
    pub currency: Currency,
    /// Status.
    pub status: PaymentStatus,
    /// Our reference sent to the gateway.
    pub merchant_reference: String,
    /// Gateway's reference.
    pub provider_ref: Option<String>,
    /// Gateway status URL.
    pub poll_url: Option<String>,
    /// Browser redirect for card/bank flows.
    pub redirect_url: Option<String>,
    /// Payer instructions for mobile and cash flows.
    pub instructions: Option<String>,
    /// Payer phone for mobile flows.
    pub payer_phone: Option<String>,
    /// Payer email.
    pub payer_email: Option<String>,
    /// Applied promo.
    pub promo: Option<PromoSnapshot>,
    /// Capture time.
    pub captured_at: Option<DateTime<Utc>>,
    /// Captured amount.
    pub captured_amount: Option<Decimal>,
    /// Refunds, oldest first.
    pub refunds: Vec<Refund>,
    /// Optimistic concurrency version.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Sum of recorded refunds.
    #[must_use]
    pub fn refunded_total(&self) -> Decimal {
        self.refunds.iter().map(|r| r.amount).sum()
    }

    /// Remaining refundable amount.
    #[must_use]
    pub fn refundable(&self) -> Decimal {
        self.captured_amount.unwrap_or_default() - self.refunded_total()
    }

    /// Amount before the current promo.
    #[must_use]
    pub fn base_amount(&self) -> Decimal {
        self.amount + self.promo.as_ref().map_or(Decimal::ZERO, |p| p.discount)
    }

    /// Apply a reconciled status under the monotonic rule.
    ///
    /// Moving into `Paid` records `captured_at` and `captured_amount`.
    pub fn apply_status(&mut self, next: PaymentStatus, now: DateTime<Utc>) -> StatusChange {
        if !self.status.can_advance_to(next) {
            return StatusChange::Unchanged;
        }
        let from = self.status;
        self.status = next;
        self.updated_at = now;
        if next == PaymentStatus::Paid {
            self.captured_at = Some(now);
            self.captured_amount = Some(self.amount);
        }
        StatusChange::Advanced { from, to: next }
    }
}
