use super::ids::PromoCodeId;
use super::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Discount rule type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoType {
    /// Percentage in `(0, 100]`.
    Percent,
    /// Fixed amount in the promo's currency.
    Fixed,
}

/// What a promo may be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoScope {
    /// Vehicle reservations.
    Reservation,
    /// Driver bookings.
    DriverBooking,
}

/// Extra applicability rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoConstraints {
    /// Minimum base amount.
    pub min_amount: Option<Decimal>,
    /// Restrict to these booking kinds; empty means any.
    #[serde(default)]
    pub applies_to: Vec<PromoScope>,
}

/// Discount rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Identifier.
    pub id: PromoCodeId,
    /// Code, stored upper-case.
    pub code: String,
    /// Rule type.
    pub promo_type: PromoType,
    /// Percentage or fixed amount.
    pub value: Decimal,
    /// Required for fixed promos.
    pub currency: Option<Currency>,
    /// Valid from (inclusive).
    pub valid_from: Option<DateTime<Utc>>,
    /// Valid until (exclusive).
    pub valid_until: Option<DateTime<Utc>>,
    /// Maximum redemptions.
    pub usage_limit: Option<u32>,
    /// Redemptions so far.
    pub used_count: u32,
    /// Administrative switch.
    pub is_active: bool,
    /// Applicability rules.
    #[serde(default)]
    pub constraints: PromoConstraints,
}

impl PromoCode {
    /// Canonical form used for lookups.
    #[must_use]
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_ascii_uppercase()
    }

    /// Type-specific value rules.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self.promo_type {
            PromoType::Percent => self.value > Decimal::ZERO && self.value <= Decimal::ONE_HUNDRED,
            PromoType::Fixed => self.value > Decimal::ZERO && self.currency.is_some(),
        }
    }

    /// Usage limit reached.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }
}
