//! Precision-safe numeric types for contracts.
//!
//! Asset prices and notional quantities use `rust_decimal` for exact
//! decimal arithmetic. Collateral is tracked in whole satoshis.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// Satoshis in one whole settlement unit.
pub const SATS_PER_UNIT: i64 = 100_000_000;

/// Price of one settlement unit expressed in an asset.
///
/// 65000 in USD means one BTC costs 65000 USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Absolute difference from another price.
    #[inline]
    pub fn abs_diff(&self, other: Price) -> Decimal {
        (self.0 - other.0).abs()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Asset quantity with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(pub Decimal);

impl Quantity {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Quantity {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Quantity {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Div<Decimal> for Quantity {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl Mul<Decimal> for Quantity {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Whole satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sats(pub i64);

impl Sats {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// `percent`% of this amount, rounded half away from zero.
    ///
    /// Returns `None` if the result does not fit in an `i64`.
    pub fn percent(&self, percent: Decimal) -> Option<Sats> {
        round_to_sats(Decimal::from(self.0) * percent / Decimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Sats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

impl From<i64> for Sats {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

impl Add for Sats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Sats {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Collateral implied by a notional quantity at the given price.
///
/// `round(notional / price * SATS_PER_UNIT)`, half away from zero.
/// Returns `None` when the price is not positive or the result overflows.
pub fn expected_sats(notional: Quantity, price: Price) -> Option<Sats> {
    if !price.is_positive() {
        return None;
    }
    let units = notional.0.checked_div(price.0)?;
    round_to_sats(units.checked_mul(Decimal::from(SATS_PER_UNIT))?)
}

fn round_to_sats(value: Decimal) -> Option<Sats> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .map(Sats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_expected_sats_at_unit_price() {
        let sats = expected_sats(Quantity::new(dec!(100)), Price::ONE).unwrap();
        assert_eq!(sats, Sats(100 * SATS_PER_UNIT));
    }

    #[test]
    fn test_expected_sats_rounds_half_away_from_zero() {
        // 1 / 200_000_000 BTC = 0.5 sat
        let sats = expected_sats(Quantity::new(dec!(1)), Price::new(dec!(200000000))).unwrap();
        assert_eq!(sats, Sats(1));

        // 100 / 101 * 1e8 = 99009900.990099...
        let sats = expected_sats(Quantity::new(dec!(1)), Price::new(dec!(101))).unwrap();
        assert_eq!(sats, Sats(990_099));
    }

    #[test]
    fn test_expected_sats_requires_positive_price() {
        assert!(expected_sats(Quantity::new(dec!(10)), Price::ZERO).is_none());
        assert!(expected_sats(Quantity::new(dec!(10)), Price::new(dec!(-1))).is_none());
    }

    #[test]
    fn test_sats_percent() {
        let held = Sats(10_000_000_000);
        assert_eq!(held.percent(dec!(1)), Some(Sats(100_000_000)));
        assert_eq!(Sats(3).percent(dec!(50)), Some(Sats(2)));
        assert_eq!(Sats(5).percent(dec!(0)), Some(Sats::ZERO));
    }

    #[test]
    fn test_price_abs_diff() {
        let a = Price::new(dec!(100.5));
        let b = Price::new(dec!(101.75));
        assert_eq!(a.abs_diff(b), dec!(1.25));
        assert_eq!(b.abs_diff(a), dec!(1.25));
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&Sats(42)).unwrap();
        assert_eq!(json, "42");
        let q: Quantity = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(q, Quantity::new(dec!(12.5)));
    }
}
