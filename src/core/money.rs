//! Fixed-point money.
//!
//! Amounts are held as a whole number of ten-thousandths so that balances can be
//! incremented inside SQL without ever passing through binary floating point.
//! Conversions to and from [`Decimal`] round half away from zero to four places,
//! and every rendered amount carries exactly four fractional digits.

use crate::errors::{Error, Result};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use sea_orm::DeriveValueType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    ops::Neg,
    str::FromStr,
    sync::LazyLock,
};

/// Number of fractional digits carried by every amount.
pub const SCALE: u32 = 4;

const UNITS_PER_WHOLE: i64 = 10_000;

#[allow(clippy::expect_used)]
static AMOUNT_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+(\.\d{1,4})?$").expect("amount pattern is a valid regex")
});

/// A signed amount with four fractional digits, stored as ten-thousandths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, DeriveValueType)]
pub struct Money(i64);

impl Money {
    /// Zero in any currency.
    pub const ZERO: Self = Self(0);

    /// Builds an amount from raw ten-thousandths.
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    /// Raw ten-thousandths, the value persisted in the database.
    #[must_use]
    pub const fn units(self) -> i64 {
        self.0
    }

    /// Converts a decimal, rounding half away from zero to four places.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        value
            .round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::from(UNITS_PER_WHOLE))
            .and_then(|scaled| scaled.to_i64())
            .map(Self)
            .ok_or(Error::AmountOverflow)
    }

    /// The amount as a decimal with scale 4.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, SCALE)
    }

    /// True for strictly positive amounts.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Addition that reports overflow instead of wrapping.
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0.checked_add(other.0).map(Self).ok_or(Error::AmountOverflow)
    }

    /// Subtraction that reports overflow instead of wrapping.
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.0.checked_sub(other.0).map(Self).ok_or(Error::AmountOverflow)
    }

    /// Sums `amounts`, failing with [`Error::AmountOverflow`] instead of wrapping.
    pub fn checked_sum<I>(amounts: I) -> Result<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts.into_iter().try_fold(Self::ZERO, Self::checked_add)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = Error;

    /// Parses the boundary format `-?\d+(\.\d{1,4})?`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidAmount {
            amount: s.to_string(),
        };
        if !AMOUNT_FORMAT.is_match(s) {
            return Err(invalid());
        }
        let value = Decimal::from_str(s).map_err(|_| invalid())?;
        Self::from_decimal(value)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.to_decimal()
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
