//! Inter-branch commission splitting
//!
//! The remittance charge is shared between the source branch (which took the
//! cash in), the paying branch (which pays it out) and head office. Legs are
//! rounded to cash precision; any rounding remainder lands on the head-office
//! leg so the legs always sum exactly to the charge.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::error::DomainError;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Percentage shares of the remittance charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionShares {
    pub source_pct: Decimal,
    pub paying_pct: Decimal,
    pub head_office_pct: Decimal,
}

impl CommissionShares {
    /// Validate shares: each non-negative, together exactly 100.
    pub fn new(
        source_pct: Decimal,
        paying_pct: Decimal,
        head_office_pct: Decimal,
    ) -> Result<Self, DomainError> {
        if source_pct < Decimal::ZERO
            || paying_pct < Decimal::ZERO
            || head_office_pct < Decimal::ZERO
        {
            return Err(DomainError::InvalidCommissionShares(
                "Shares must be non-negative".to_string(),
            ));
        }
        let sum = source_pct + paying_pct + head_office_pct;
        if sum != ONE_HUNDRED {
            return Err(DomainError::InvalidCommissionShares(format!(
                "Shares must sum to 100, got {}",
                sum
            )));
        }
        Ok(Self {
            source_pct,
            paying_pct,
            head_office_pct,
        })
    }

    /// Split a charge into three legs that sum exactly to it.
    ///
    /// Source and paying legs are rounded half-up to 2 decimal places; the
    /// head-office leg absorbs the rounding remainder.
    pub fn split(&self, charge: Decimal) -> Result<CommissionSplit, DomainError> {
        if charge < Decimal::ZERO {
            return Err(DomainError::InvalidAmount(format!(
                "Charge must not be negative (got {})",
                charge
            )));
        }

        let source = round_cash(charge * self.source_pct / ONE_HUNDRED);
        let paying = round_cash(charge * self.paying_pct / ONE_HUNDRED);
        let head_office = charge - source - paying;

        if head_office < Decimal::ZERO {
            // Only reachable with degenerate shares like 99.999.. after
            // rounding both other legs up on a sub-cent charge.
            return Err(DomainError::InvalidCommissionShares(format!(
                "Rounded legs exceed charge {}",
                charge
            )));
        }

        Ok(CommissionSplit {
            source,
            paying,
            head_office,
        })
    }
}

fn round_cash(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Concrete commission legs for one remittance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    /// Leg earned by the source branch
    pub source: Decimal,
    /// Leg earned by the paying branch
    pub paying: Decimal,
    /// Leg earned by head office (absorbs rounding)
    pub head_office: Decimal,
}

impl CommissionSplit {
    /// Sum of all legs.
    pub fn total(&self) -> Decimal {
        self.source + self.paying + self.head_office
    }
}
