//! Entity fixtures.

use super::at;
use carhire_core::types::{
    Currency, DriverProfile, DriverProfileId, DriverProfileStatus, Principal, PromoCode,
    PromoCodeId, PromoConstraints, PromoType, Role, User, UserId, UserStatus,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Deterministic user id.
#[must_use]
pub fn user_id(n: u128) -> UserId {
    UserId::from_uuid(Uuid::from_u128(0x1000 + n))
}

/// Active user with the given roles.
#[must_use]
pub fn user(n: u128, roles: &[Role]) -> User {
    User {
        id: user_id(n),
        email: format!("user{n}@carhire.test"),
        full_name: format!("User {n}"),
        phone: Some(format!("077{n:07}")),
        roles: roles.iter().copied().collect(),
        status: UserStatus::Active,
        created_at: at("2024-12-01T00:00:00Z"),
    }
}

/// Principal for a user.
#[must_use]
pub fn principal(user: &User) -> Principal {
    Principal::new(user.id, user.roles.iter().copied())
}

/// Approved, available driver profile.
#[must_use]
pub fn driver_profile(user: &User, hourly_rate: Decimal) -> DriverProfile {
    DriverProfile {
        id: DriverProfileId::from_uuid(Uuid::from_u128(0x2000 + user.id.as_uuid().as_u128())),
        user_id: user.id,
        status: DriverProfileStatus::Approved,
        is_available: true,
        hourly_rate,
        currency: Currency::Usd,
    }
}

/// Active percent promo valid throughout 2025.
#[must_use]
pub fn percent_promo(code: &str, value: Decimal) -> PromoCode {
    PromoCode {
        id: PromoCodeId::from_uuid(Uuid::from_u128(
            code.bytes()
                .fold(0x3000_u128, |acc, b| acc.wrapping_mul(31).wrapping_add(u128::from(b))),
        )),
        code: PromoCode::normalize_code(code),
        promo_type: PromoType::Percent,
        value,
        currency: None,
        valid_from: Some(at("2025-01-01T00:00:00Z")),
        valid_until: Some(at("2026-01-01T00:00:00Z")),
        usage_limit: None,
        used_count: 0,
        is_active: true,
        constraints: PromoConstraints::default(),
    }
}

/// Active fixed-amount promo valid throughout 2025.
#[must_use]
pub fn fixed_promo(code: &str, value: Decimal, currency: Currency) -> PromoCode {
    PromoCode {
        promo_type: PromoType::Fixed,
        currency: Some(currency),
        ..percent_promo(code, value)
    }
}
