//! Money amounts in minor currency units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors converting external amounts into [`Money`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The amount does not fit in minor units.
    #[error("Amount out of range: {0}")]
    OutOfRange(Decimal),
}

/// Money amount represented in minor units (paise, cents) to avoid floating
/// point issues.
///
/// The wire format talks in major units: `Money` serializes as a JSON
/// number such as `499.5`. Payment gateways expect minor units, which is
/// what [`Money::minor`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money {
    /// Amount in minor units (e.g., 1000 = 10.00)
    minor: i64,
}

impl Money {
    /// Creates a new amount from minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    /// Creates a new amount from a whole number of major units.
    pub fn from_major_units(major: i64) -> Self {
        Self { minor: major * 100 }
    }

    /// Converts a major-unit decimal (e.g. `499.50`) into minor units.
    ///
    /// Fractions beyond two digits are rounded half away from zero.
    pub fn from_major(amount: Decimal) -> Result<Self, MoneyError> {
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|minor| minor.to_i64())
            .map(Self::from_minor)
            .ok_or(MoneyError::OutOfRange(amount))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { minor: 0 }
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the amount in major units as a decimal with two fractional digits.
    pub fn as_major(&self) -> Decimal {
        Decimal::new(self.minor, 2)
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Multiplies by a quantity, failing instead of overflowing.
    pub fn checked_mul(&self, quantity: u32) -> Result<Money, MoneyError> {
        self.minor
            .checked_mul(i64::from(quantity))
            .map(Self::from_minor)
            .ok_or_else(|| MoneyError::OutOfRange(self.as_major() * Decimal::from(quantity)))
    }

    /// Adds two amounts, failing instead of overflowing.
    pub fn checked_add(&self, rhs: Money) -> Result<Money, MoneyError> {
        self.minor
            .checked_add(rhs.minor)
            .map(Self::from_minor)
            .ok_or_else(|| MoneyError::OutOfRange(self.as_major() + rhs.as_major()))
    }

    /// Sums amounts, failing on the first overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_major())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(&self.as_major(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let major = rust_decimal::serde::float::deserialize(deserializer)?;
        Money::from_major(major).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(1234);
        assert_eq!(money.minor(), 1234);
        assert_eq!(money.as_major(), Decimal::from_str("12.34").unwrap());
    }

    #[test]
    fn test_from_major_units() {
        assert_eq!(Money::from_major_units(50).minor(), 5000);
    }

    #[test]
    fn test_from_major_decimal() {
        let money = Money::from_major(Decimal::from_str("499.5").unwrap()).unwrap();
        assert_eq!(money.minor(), 49950);
    }

    #[test]
    fn test_from_major_rounds_to_two_places() {
        let money = Money::from_major(Decimal::from_str("0.125").unwrap()).unwrap();
        assert_eq!(money.minor(), 13);
    }

    #[test]
    fn test_from_major_out_of_range() {
        let result = Money::from_major(Decimal::MAX);
        assert!(matches!(result, Err(MoneyError::OutOfRange(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1234).to_string(), "12.34");
        assert_eq!(Money::from_minor(100).to_string(), "1.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!(a.checked_add(b).unwrap().minor(), 1500);
        assert_eq!(a.checked_mul(3).unwrap().minor(), 3000);
    }

    #[test]
    fn test_sum() {
        let total = Money::checked_sum([100, 250, 650].into_iter().map(Money::from_minor)).unwrap();
        assert_eq!(total.minor(), 1000);
        assert!(Money::checked_sum(std::iter::empty()).unwrap().is_zero());
    }

    #[test]
    fn test_overflow_is_out_of_range() {
        let huge = Money::from_minor(50_000_000_000_000_000);
        assert!(matches!(huge.checked_mul(1000), Err(MoneyError::OutOfRange(_))));

        let max = Money::from_minor(i64::MAX);
        assert!(matches!(
            max.checked_add(Money::from_minor(1)),
            Err(MoneyError::OutOfRange(_))
        ));
        assert!(Money::checked_sum([max, max]).is_err());
    }

    #[test]
    fn test_serializes_as_major_number() {
        let json = serde_json::to_string(&Money::from_minor(49950)).unwrap();
        assert_eq!(json, "499.5");

        let parsed: Money = serde_json::from_str("12.34").unwrap();
        assert_eq!(parsed.minor(), 1234);

        let whole: Money = serde_json::from_str("250").unwrap();
        assert_eq!(whole.minor(), 25000);
    }

    #[test]
    fn test_sign_checks() {
        assert!(Money::from_minor(100).is_positive());
        assert!(Money::from_minor(0).is_zero());
        assert!(Money::from_minor(-100).is_negative());
    }
}
