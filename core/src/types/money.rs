use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement currencies accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar.
    Usd,
    /// Zimbabwe dollar.
    Zwl,
}

impl Currency {
    /// ISO-style code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Zwl => "ZWL",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "ZWL" => Ok(Self::Zwl),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// Normalise an amount to two decimal places, half away from zero.
///
/// ```
/// use carhire_core::types::round_money;
/// use rust_decimal::Decimal;
///
/// assert_eq!(round_money(Decimal::new(80, 0)).to_string(), "80.00");
/// assert_eq!(round_money(Decimal::new(12345, 3)).to_string(), "12.35");
/// ```
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}
