//! Money type
//!
//! Domain primitive for wallet amounts and balances.
//! A `Money` value is always non-negative; every arithmetic operation returns a
//! new instance or a typed error, so an invalid amount can never exist.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest scale `rust_decimal` can represent.
const MAX_SCALE: u32 = 28;

/// Money represents a non-negative monetary value.
///
/// # Invariants
/// - Value is always zero or positive
/// - Equality and ordering are by exact numeric value (`1.0 == 1.00`)
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use digital_wallet::domain::Money;
///
/// let balance = Money::new(Decimal::new(100, 0)).unwrap();
/// let amount = Money::new(Decimal::new(40, 0)).unwrap();
///
/// let left = balance.decrease(&amount).unwrap();
/// assert_eq!(left.value(), Decimal::new(60, 0));
/// assert!(left.decrease(&balance).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(Decimal);

/// Errors that can occur when creating or combining Money
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Amount cannot be negative (got {0})")]
    Negative(Decimal),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Amount exceeds the representable decimal range")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),

    #[error("Invalid decimal scale (max {MAX_SCALE}, got {0})")]
    InvalidScale(u32),
}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create a new Money value.
    ///
    /// # Errors
    /// - `MoneyError::Negative` if value < 0
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyError::Negative(value));
        }

        // -0 is normalized away so equal values serialize the same way
        Ok(Self(value.abs()))
    }

    /// Create Money from a fixed-point integer, e.g. `(1050, 2)` is `10.50`.
    pub fn from_minor_units(units: i64, scale: u32) -> Result<Self, MoneyError> {
        if scale > MAX_SCALE {
            return Err(MoneyError::InvalidScale(scale));
        }
        Self::new(Decimal::new(units, scale))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.0.is_zero()
    }

    /// Return `self + other`.
    ///
    /// The sum of two non-negative values is non-negative, so the only failure
    /// is running out of decimal range.
    pub fn increase(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Return `self - other`.
    ///
    /// # Errors
    /// - `MoneyError::InsufficientBalance` if other > self
    pub fn decrease(&self, other: &Money) -> Result<Money, MoneyError> {
        if other.0 > self.0 {
            return Err(MoneyError::InsufficientBalance {
                required: other.0,
                available: self.0,
            });
        }

        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Check if this balance covers the given amount.
    pub fn is_sufficient_for(&self, amount: &Money) -> bool {
        self.0 >= amount.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Input that does not fit exactly is rejected, never rounded
        let decimal = Decimal::from_str_exact(s.trim())
            .map_err(|e| MoneyError::ParseError(e.to_string()))?;
        Money::new(decimal)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Money::from_str(&value)
    }
}

impl From<Money> for String {
    fn from(money: Money) -> Self {
        money.0.to_string()
    }
}
