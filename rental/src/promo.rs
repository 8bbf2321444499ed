//! Promo evaluation.
//!
//! [`evaluate`] is pure: given a promo (or its absence) and the purchase
//! context it either yields a discount or a [`PromoWarning`]. An invalid promo
//! never fails a payment; callers continue without a discount and surface the
//! warning code.

use std::sync::Arc;

use carhire_core::error::DomainResult;
use carhire_core::repository::PromoRepository;
use carhire_core::types::{
    Currency, PromoCode, PromoCodeId, PromoScope, PromoSnapshot, PromoType, round_money,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a promo was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromoWarning {
    /// No promo with that code.
    NotFound,
    /// Switched off by an administrator.
    Inactive,
    /// `valid_from` is still ahead.
    NotYetValid,
    /// `valid_until` has passed.
    Expired,
    /// `usage_limit` reached.
    UsageExceeded,
    /// Purchase below `constraints.min_amount`.
    MinAmountNotMet,
    /// Fixed promo in another currency.
    CurrencyMismatch,
    /// Promo not valid for this kind of booking, or malformed.
    NotApplicable,
}

impl PromoWarning {
    /// Wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Inactive => "INACTIVE",
            Self::NotYetValid => "NOT_YET_VALID",
            Self::Expired => "EXPIRED",
            Self::UsageExceeded => "USAGE_EXCEEDED",
            Self::MinAmountNotMet => "MIN_AMOUNT_NOT_MET",
            Self::CurrencyMismatch => "CURRENCY_MISMATCH",
            Self::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl std::fmt::Display for PromoWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The purchase a promo is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromoContext {
    /// Amount before discount.
    pub amount: Decimal,
    /// Purchase currency.
    pub currency: Currency,
    /// What is being paid for.
    pub scope: PromoScope,
    /// Evaluation instant.
    pub now: DateTime<Utc>,
}

/// Result of evaluating a promo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoOutcome {
    /// The promo applies.
    Applied {
        /// Promo id.
        promo_id: PromoCodeId,
        /// Normalised code.
        code: String,
        /// Discount, never above the amount.
        discount: Decimal,
    },
    /// The promo does not apply.
    Rejected(PromoWarning),
}

impl PromoOutcome {
    /// Snapshot to store on the payment, when applied.
    #[must_use]
    pub fn snapshot(&self) -> Option<PromoSnapshot> {
        match self {
            Self::Applied {
                promo_id,
                code,
                discount,
            } => Some(PromoSnapshot {
                promo_id: *promo_id,
                code: code.clone(),
                discount: *discount,
            }),
            Self::Rejected(_) => None,
        }
    }

    /// Warning, when rejected.
    #[must_use]
    pub const fn warning(&self) -> Option<PromoWarning> {
        match self {
            Self::Applied { .. } => None,
            Self::Rejected(w) => Some(*w),
        }
    }

    /// Discount, zero when rejected.
    #[must_use]
    pub fn discount(&self) -> Decimal {
        match self {
            Self::Applied { discount, .. } => *discount,
            Self::Rejected(_) => Decimal::ZERO,
        }
    }
}

/// Amount due after a discount: `max(0, base - discount)`.
#[must_use]
pub fn payable(base: Decimal, discount: Decimal) -> Decimal {
    round_money((base - discount).max(Decimal::ZERO))
}

/// Discount `promo` grants on `amount`, clamped to `[0, amount]`.
#[must_use]
pub fn discount_for(promo: &PromoCode, amount: Decimal) -> Decimal {
    let raw = match promo.promo_type {
        PromoType::Percent => amount * promo.value / Decimal::ONE_HUNDRED,
        PromoType::Fixed => promo.value,
    };
    round_money(raw.clamp(Decimal::ZERO, amount.max(Decimal::ZERO)))
}

/// Evaluate `promo` against `ctx`.
#[must_use]
pub fn evaluate(promo: Option<&PromoCode>, ctx: &PromoContext) -> PromoOutcome {
    let Some(promo) = promo else {
        return PromoOutcome::Rejected(PromoWarning::NotFound);
    };
    let reject = PromoOutcome::Rejected;

    if !promo.is_active {
        return reject(PromoWarning::Inactive);
    }
    if !promo.is_well_formed() {
        return reject(PromoWarning::NotApplicable);
    }
    if promo.valid_from.is_some_and(|from| ctx.now < from) {
        return reject(PromoWarning::NotYetValid);
    }
    if promo.valid_until.is_some_and(|until| ctx.now >= until) {
        return reject(PromoWarning::Expired);
    }
    if promo.is_exhausted() {
        return reject(PromoWarning::UsageExceeded);
    }
    if promo.promo_type == PromoType::Fixed && promo.currency != Some(ctx.currency) {
        return reject(PromoWarning::CurrencyMismatch);
    }
    let scopes = &promo.constraints.applies_to;
    if !scopes.is_empty() && !scopes.contains(&ctx.scope) {
        return reject(PromoWarning::NotApplicable);
    }
    if promo.constraints.min_amount.is_some_and(|min| ctx.amount < min) {
        return reject(PromoWarning::MinAmountNotMet);
    }

    PromoOutcome::Applied {
        promo_id: promo.id,
        code: PromoCode::normalize_code(&promo.code),
        discount: discount_for(promo, ctx.amount),
    }
}

/// Looks promo codes up and evaluates them.
#[derive(Clone)]
pub struct PromoEvaluator {
    promos: Arc<dyn PromoRepository>,
}

impl PromoEvaluator {
    /// Evaluator over `promos`.
    #[must_use]
    pub fn new(promos: Arc<dyn PromoRepository>) -> Self {
        Self { promos }
    }

    /// Resolve `code` and evaluate it.
    ///
    /// # Errors
    ///
    /// Only storage failures; an unusable code is a [`PromoOutcome::Rejected`].
    pub async fn evaluate_code(&self, code: &str, ctx: &PromoContext) -> DomainResult<PromoOutcome> {
        let promo = self.promos.find_by_code(code).await?;
        let outcome = evaluate(promo.as_ref(), ctx);
        if let Some(warning) = outcome.warning() {
            tracing::debug!(code, %warning, "Promo not applied");
        }
        Ok(outcome)
    }

    /// Count one redemption of `id`.
    ///
    /// # Errors
    ///
    /// `PROMO_USAGE_EXCEEDED` at the limit, or a storage failure.
    pub async fn redeem(&self, id: PromoCodeId) -> DomainResult<PromoCode> {
        self.promos.increment_usage(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use carhire_testing::{at, fixtures};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn ctx(amount: Decimal) -> PromoContext {
        PromoContext {
            amount,
            currency: Currency::Usd,
            scope: PromoScope::DriverBooking,
            now: at("2025-03-01T10:00:00Z"),
        }
    }

    #[test]
    fn percent_promo_discounts_proportionally() {
        let promo = fixtures::percent_promo("WELCOME10", dec!(10));
        let outcome = evaluate(Some(&promo), &ctx(dec!(100)));
        assert_eq!(outcome.discount(), dec!(10.00));
        assert_eq!(payable(dec!(100), outcome.discount()), dec!(90.00));
        assert_eq!(outcome.snapshot().map(|s| s.code), Some("WELCOME10".to_string()));
    }

    #[test]
    fn fixed_promo_is_clamped_to_amount() {
        let promo = fixtures::fixed_promo("BIG", dec!(500), Currency::Usd);
        let outcome = evaluate(Some(&promo), &ctx(dec!(80)));
        assert_eq!(outcome.discount(), dec!(80.00));
        assert_eq!(payable(dec!(80), outcome.discount()), Decimal::ZERO);
    }

    #[test]
    fn warnings_in_order() {
        assert_eq!(evaluate(None, &ctx(dec!(10))).warning(), Some(PromoWarning::NotFound));

        let mut promo = fixtures::percent_promo("OLD", dec!(10));
        promo.valid_until = Some(at("2025-01-01T00:00:00Z"));
        assert_eq!(
            evaluate(Some(&promo), &ctx(dec!(10))).warning(),
            Some(PromoWarning::Expired)
        );

        promo.is_active = false;
        assert_eq!(
            evaluate(Some(&promo), &ctx(dec!(10))).warning(),
            Some(PromoWarning::Inactive)
        );

        let mut early = fixtures::percent_promo("SOON", dec!(10));
        early.valid_from = Some(at("2025-06-01T00:00:00Z"));
        assert_eq!(
            evaluate(Some(&early), &ctx(dec!(10))).warning(),
            Some(PromoWarning::NotYetValid)
        );

        let mut used = fixtures::percent_promo("USED", dec!(10));
        used.usage_limit = Some(2);
        used.used_count = 2;
        assert_eq!(
            evaluate(Some(&used), &ctx(dec!(10))).warning(),
            Some(PromoWarning::UsageExceeded)
        );
    }

    #[test]
    fn constraints_are_checked() {
        let zwl = fixtures::fixed_promo("ZW5", dec!(5), Currency::Zwl);
        assert_eq!(
            evaluate(Some(&zwl), &ctx(dec!(10))).warning(),
            Some(PromoWarning::CurrencyMismatch)
        );

        let mut scoped = fixtures::percent_promo("CARS", dec!(10));
        scoped.constraints.applies_to = vec![PromoScope::Reservation];
        assert_eq!(
            evaluate(Some(&scoped), &ctx(dec!(10))).warning(),
            Some(PromoWarning::NotApplicable)
        );

        let mut minimum = fixtures::percent_promo("MIN50", dec!(10));
        minimum.constraints.min_amount = Some(dec!(50));
        assert_eq!(
            evaluate(Some(&minimum), &ctx(dec!(10))).warning(),
            Some(PromoWarning::MinAmountNotMet)
        );
    }

    #[test]
    fn malformed_percent_is_not_applicable() {
        let promo = fixtures::percent_promo("HUGE", dec!(150));
        assert_eq!(
            evaluate(Some(&promo), &ctx(dec!(10))).warning(),
            Some(PromoWarning::NotApplicable)
        );
    }

    #[test]
    fn warning_serializes_as_code() {
        assert_eq!(
            serde_json::to_value(PromoWarning::Expired).unwrap(),
            serde_json::json!("EXPIRED")
        );
    }

    proptest! {
        #[test]
        fn payable_is_never_negative_and_matches_formula(
            cents in 0i64..10_000_000,
            percent in 1u32..=100,
        ) {
            let base = Decimal::new(cents, 2);
            let promo = fixtures::percent_promo("P", Decimal::from(percent));
            let outcome = evaluate(Some(&promo), &ctx(base));
            let due = payable(base, outcome.discount());
            prop_assert!(due >= Decimal::ZERO);
            prop_assert!(outcome.discount() <= base);
            prop_assert_eq!(due, round_money((base - outcome.discount()).max(Decimal::ZERO)));
        }
    }
}
