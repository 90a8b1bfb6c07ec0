//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::status::RemittanceStatus;

/// Business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Till does not hold enough cash for a dispense
    #[error("Insufficient till cash: required {required}, available {available}")]
    InsufficientTillCash {
        required: Decimal,
        available: Decimal,
    },

    /// Till does not hold enough notes/coins of one denomination
    #[error("Insufficient denomination {denomination}: requested {requested}, available {available}")]
    InsufficientDenomination {
        denomination: Decimal,
        requested: u32,
        available: u32,
    },

    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid denomination face value
    #[error("Invalid denomination: {0}")]
    InvalidDenomination(Decimal),

    /// Denominated cash does not add up to the posted amount
    #[error("Drawer total {drawer_total} does not match posted amount {amount}")]
    DrawerAmountMismatch {
        drawer_total: Decimal,
        amount: Decimal,
    },

    /// Remittance lifecycle violation
    #[error("Invalid remittance status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: RemittanceStatus,
        to: RemittanceStatus,
    },

    /// Remittance has already been paid out (at-most-once collection)
    #[error("Remittance already collected")]
    AlreadyCollected,

    /// Pickup code does not match
    #[error("Wrong pickup code")]
    WrongPickupCode,

    /// Payout attempted away from the designated paying branch
    #[error("Remittance must be paid at its designated branch")]
    WrongPayingBranch,

    /// Withdrawal attempted away from the source branch
    #[error("Remittance can only be withdrawn at its source branch")]
    WrongSourceBranch,

    /// Source and paying branch must differ
    #[error("Source and paying branch must differ")]
    SameBranchRemittance,

    /// Teller is closed and cannot process cash
    #[error("Teller is closed")]
    TellerClosed,

    /// Teller not found
    #[error("Teller not found: {0}")]
    TellerNotFound(String),

    /// Remittance not found
    #[error("Remittance not found: {0}")]
    RemittanceNotFound(String),

    /// Commission shares must sum to 100 percent
    #[error("Invalid commission shares: {0}")]
    InvalidCommissionShares(String),

    /// Business rule violation
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    /// Aggregate version conflict (optimistic locking)
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: i64, found: i64 },

    /// Duplicate operation (idempotency)
    #[error("Duplicate operation: {key}")]
    DuplicateOperation { key: String },
}

impl DomainError {
    /// Create an insufficient till cash error
    pub fn insufficient_till_cash(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientTillCash {
            required,
            available,
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientTillCash { .. }
                | Self::InsufficientDenomination { .. }
                | Self::InvalidAmount(_)
                | Self::InvalidDenomination(_)
                | Self::DrawerAmountMismatch { .. }
                | Self::InvalidStatusTransition { .. }
                | Self::AlreadyCollected
                | Self::WrongPickupCode
                | Self::WrongPayingBranch
                | Self::WrongSourceBranch
                | Self::SameBranchRemittance
                | Self::TellerClosed
                | Self::InvalidCommissionShares(_)
                | Self::BusinessRuleViolation(_)
        )
    }

    /// Check if this is a conflict error (retry may help)
    pub fn is_conflict_error(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::DuplicateOperation { .. }
        )
    }
}
