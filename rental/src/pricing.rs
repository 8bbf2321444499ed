//! Pricing snapshots captured at booking time.
//!
//! Snapshots are immutable once stored: later rate changes on a driver
//! profile or vehicle model never reprice an existing booking.

use carhire_core::error::{DomainError, DomainResult, codes};
use carhire_core::types::{
    Currency, DriverPricing, DriverProfile, ReservationPricing, TimeWindow, round_money,
};
use rust_decimal::Decimal;

/// Snapshot for hiring `profile`'s driver for `hours`.
///
/// # Errors
///
/// Validation when `hours` is zero or the profile rate is negative.
pub fn driver_pricing(profile: &DriverProfile, hours: u32) -> DomainResult<DriverPricing> {
    if hours == 0 {
        return Err(DomainError::invalid_input("hours_requested must be positive"));
    }
    if profile.hourly_rate.is_sign_negative() {
        return Err(DomainError::validation(
            codes::INVALID_AMOUNT,
            "driver hourly rate is negative",
        ));
    }
    Ok(DriverPricing {
        currency: profile.currency,
        hourly_rate_snapshot: profile.hourly_rate,
        hours_requested: hours,
        estimated_total: round_money(profile.hourly_rate * Decimal::from(hours)),
    })
}

/// Rental days covered by `window`: started days count in full, minimum one.
#[must_use]
pub fn rental_days(window: &TimeWindow) -> u32 {
    let minutes = window.duration().num_minutes().max(1);
    let days = (minutes + 24 * 60 - 1) / (24 * 60);
    u32::try_from(days).unwrap_or(u32::MAX).max(1)
}

/// Snapshot for renting at `daily_rate` over `window`.
///
/// # Errors
///
/// `INVALID_AMOUNT` for a negative rate or negative fees.
pub fn reservation_pricing(
    daily_rate: Decimal,
    currency: Currency,
    window: &TimeWindow,
    fees: Decimal,
) -> DomainResult<ReservationPricing> {
    if daily_rate.is_sign_negative() || fees.is_sign_negative() {
        return Err(DomainError::validation(
            codes::INVALID_AMOUNT,
            "rates and fees must not be negative",
        ));
    }
    let days = rental_days(window);
    let subtotal = round_money(daily_rate * Decimal::from(days));
    let fees = round_money(fees);
    Ok(ReservationPricing {
        currency,
        daily_rate: round_money(daily_rate),
        days,
        subtotal,
        fees,
        total: round_money(subtotal + fees),
    })
}
