//! Denomination bookkeeping
//!
//! Tills and vaults are tracked per note/coin face value, not just as a
//! total. Every cash movement carries a [`CashDrawer`]: the exact counts of
//! each denomination handed over the counter. Counts can never go negative
//! and a movement must denominate the posted amount exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::DomainError;
use super::money::Amount;

/// A recognized note or coin face value.
///
/// Positive, at most 2 decimal places (coins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Denomination(Decimal);

impl Denomination {
    /// Create a denomination with validation.
    pub fn new(face_value: Decimal) -> Result<Self, DomainError> {
        if face_value <= Decimal::ZERO || face_value.scale() > 2 {
            return Err(DomainError::InvalidDenomination(face_value));
        }
        Ok(Self(face_value))
    }

    /// Whole-unit denomination (notes).
    pub fn from_major(face_value: i64) -> Result<Self, DomainError> {
        Self::new(Decimal::from(face_value))
    }

    /// Face value of this denomination.
    pub fn face_value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Denomination {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Denomination::new(value)
    }
}

impl From<Denomination> for Decimal {
    fn from(denomination: Denomination) -> Self {
        denomination.0
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-denomination cash counts.
///
/// Used both as the state of a till and as the payload of a single cash
/// movement (the notes handed over the counter).
///
/// # Invariants
/// - No denomination count is ever negative
/// - Zero-count entries are not stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashDrawer(BTreeMap<Denomination, u32>);

impl CashDrawer {
    /// Empty drawer.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a drawer from (face value, count) lines. Zero counts are dropped.
    pub fn from_lines<I>(lines: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (Decimal, u32)>,
    {
        let mut drawer = Self::new();
        for (face_value, count) in lines {
            let denomination = Denomination::new(face_value)?;
            drawer.add(denomination, count)?;
        }
        Ok(drawer)
    }

    /// Add `count` notes of one denomination in place.
    pub fn add(&mut self, denomination: Denomination, count: u32) -> Result<(), DomainError> {
        if count == 0 {
            return Ok(());
        }
        let entry = self.0.entry(denomination).or_insert(0);
        *entry = entry.checked_add(count).ok_or_else(|| {
            DomainError::BusinessRuleViolation(format!(
                "Denomination count overflow for {}",
                denomination
            ))
        })?;
        Ok(())
    }

    /// Merge another drawer in (cash-in, provisioning).
    pub fn deposit(&self, incoming: &CashDrawer) -> Result<CashDrawer, DomainError> {
        let mut result = self.clone();
        for (&denomination, &count) in incoming.0.iter() {
            result.add(denomination, count)?;
        }
        Ok(result)
    }

    /// Remove another drawer's counts (cash-out, till return).
    ///
    /// Fails with [`DomainError::InsufficientDenomination`] on the first
    /// denomination whose count is insufficient. The receiver is unchanged
    /// on failure.
    pub fn withdraw(&self, outgoing: &CashDrawer) -> Result<CashDrawer, DomainError> {
        let mut result = self.clone();
        for (&denomination, &count) in outgoing.0.iter() {
            let available = result.count_of(denomination);
            if available < count {
                return Err(DomainError::InsufficientDenomination {
                    denomination: denomination.face_value(),
                    requested: count,
                    available,
                });
            }
            let remaining = available - count;
            if remaining == 0 {
                result.0.remove(&denomination);
            } else {
                result.0.insert(denomination, remaining);
            }
        }
        Ok(result)
    }

    /// Check the till can supply every denomination of `outgoing`.
    pub fn can_supply(&self, outgoing: &CashDrawer) -> bool {
        outgoing
            .0
            .iter()
            .all(|(&denomination, &count)| self.count_of(denomination) >= count)
    }

    /// Total cash value: sum of face value times count.
    pub fn total(&self) -> Decimal {
        self.0
            .iter()
            .map(|(denomination, &count)| denomination.face_value() * Decimal::from(count))
            .sum()
    }

    /// A cash movement must be fully denominated: drawer total == amount.
    pub fn matches_amount(&self, amount: &Amount) -> bool {
        self.total() == amount.value()
    }

    /// Count held for one denomination.
    pub fn count_of(&self, denomination: Denomination) -> u32 {
        self.0.get(&denomination).copied().unwrap_or(0)
    }

    /// Iterate (denomination, count) lines in face-value order.
    pub fn lines(&self) -> impl Iterator<Item = (Denomination, u32)> + '_ {
        self.0.iter().map(|(&denomination, &count)| (denomination, count))
    }

    /// True when no notes are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CashDrawer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (denomination, count) in self.lines() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}x{}", count, denomination)?;
            first = false;
        }
        if first {
            write!(f, "empty")?;
        }
        Ok(())
    }
}
