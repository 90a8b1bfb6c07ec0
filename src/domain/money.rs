//! Monetary amount types
//!
//! Domain primitives for cash amounts with business rule validation.
//! All amounts are validated at construction time, ensuring invalid values
//! cannot exist in the system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

/// Maximum allowed amount on a single posting (1 billion)
const MAX_AMOUNT: &str = "1000000000";

/// Maximum decimal places (2, cash currency)
const MAX_SCALE: u32 = 2;

/// Amount represents a validated monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 2 decimal places
/// - Maximum value is 1 billion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use tellerpost::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(100, 0)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(100, 0));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    /// - `AmountError::Overflow` if value > 1 billion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        // Rule 1: Must be positive
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        // Rule 2: Maximum 2 decimal places
        if value.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        // Rule 3: Maximum 1 billion
        let max = Decimal::from_str(MAX_AMOUNT).expect("Invalid MAX_AMOUNT constant");
        if value > max {
            return Err(AmountError::Overflow);
        }

        Ok(Self(value))
    }

    /// Create an Amount from an integer (no decimal places).
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if this amount can be added to another without overflow.
    pub fn try_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        let sum = self.0 + other.0;
        Amount::new(sum)
    }

    /// Check if this amount is greater than or equal to another.
    pub fn is_sufficient_for(&self, other: &Amount) -> bool {
        self.0 >= other.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s)
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        format!("{:.2}", amount.0)
    }
}

impl Add for Amount {
    type Output = Result<Amount, AmountError>;

    fn add(self, rhs: Self) -> Self::Output {
        self.try_add(&rhs)
    }
}

// Note: We don't implement Sub directly because the result might be <= 0
// Instead, use explicit subtraction with validation

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(Decimal::new(100, 0));
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), Decimal::new(100, 0));
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(Decimal::ZERO);
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(Decimal::new(-100, 0));
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        // 0.125 has 3 decimal places
        let amount = Amount::new(Decimal::new(125, 3));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(3))));
    }

    #[test]
    fn test_amount_max_decimals_ok() {
        // 0.25 has 2 decimal places
        let amount = Amount::new(Decimal::new(25, 2));
        assert!(amount.is_ok());
    }

    #[test]
    fn test_amount_overflow() {
        // 1 billion + 1
        let value = Decimal::from_str("1000000001").unwrap();
        let amount = Amount::new(value);
        assert!(matches!(amount, Err(AmountError::Overflow)));
    }

    #[test]
    fn test_amount_max_value_ok() {
        let value = Decimal::from_str("1000000000").unwrap();
        let amount = Amount::new(value);
        assert!(amount.is_ok());
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Result<Amount, _> = "123.45".parse();
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), Decimal::new(12345, 2));
    }

    #[test]
    fn test_amount_try_add() {
        let a = Amount::new(Decimal::new(100, 0)).unwrap();
        let b = Amount::new(Decimal::new(50, 0)).unwrap();
        let sum = a.try_add(&b).unwrap();
        assert_eq!(sum.value(), Decimal::new(150, 0));
    }
}
