//! Domain Events
//!
//! Event definitions for Event Sourcing.
//! Events are immutable facts that have happened in the system.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cash::CashDrawer;
use super::commission::{CommissionShares, CommissionSplit};

/// Teller-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TellerEvent {
    /// Teller position was opened for the day
    TellerOpened {
        teller_id: Uuid,
        branch_id: Uuid,
        operator_user_id: Uuid,
        name: String,
        opened_at: DateTime<Utc>,
    },

    /// Till was provisioned with cash from the vault
    TillProvisioned {
        teller_id: Uuid,
        drawer: CashDrawer,
        vault_reference: String,
        provisioned_at: DateTime<Utc>,
    },

    /// Cash was returned from the till to the vault
    TillReturned {
        teller_id: Uuid,
        drawer: CashDrawer,
        vault_reference: String,
        returned_at: DateTime<Utc>,
    },

    /// Cash was taken over the counter (cash-in)
    CashDeposited {
        teller_id: Uuid,
        transaction_id: Uuid,
        amount: Decimal,
        drawer: CashDrawer,
        description: String,
        deposited_at: DateTime<Utc>,
    },

    /// Cash was paid out over the counter (cash-out)
    CashDispensed {
        teller_id: Uuid,
        transaction_id: Uuid,
        amount: Decimal,
        drawer: CashDrawer,
        description: String,
        dispensed_at: DateTime<Utc>,
    },

    /// Teller position was closed
    TellerClosed {
        teller_id: Uuid,
        closing_drawer: CashDrawer,
        closed_at: DateTime<Utc>,
    },
}

impl TellerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TellerEvent::TellerOpened { .. } => "TellerOpened",
            TellerEvent::TillProvisioned { .. } => "TillProvisioned",
            TellerEvent::TillReturned { .. } => "TillReturned",
            TellerEvent::CashDeposited { .. } => "CashDeposited",
            TellerEvent::CashDispensed { .. } => "CashDispensed",
            TellerEvent::TellerClosed { .. } => "TellerClosed",
        }
    }

    /// Get the teller ID this event relates to
    pub fn teller_id(&self) -> Uuid {
        match self {
            TellerEvent::TellerOpened { teller_id, .. } => *teller_id,
            TellerEvent::TillProvisioned { teller_id, .. } => *teller_id,
            TellerEvent::TillReturned { teller_id, .. } => *teller_id,
            TellerEvent::CashDeposited { teller_id, .. } => *teller_id,
            TellerEvent::CashDispensed { teller_id, .. } => *teller_id,
            TellerEvent::TellerClosed { teller_id, .. } => *teller_id,
        }
    }
}

/// Remittance-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RemittanceEvent {
    /// Remittance cash-in posted at the source branch
    RemittanceInitiated {
        remittance_id: Uuid,
        reference: String,
        source_branch_id: Uuid,
        paying_branch_id: Uuid,
        source_teller_id: Uuid,
        sender_name: String,
        sender_phone: String,
        receiver_name: String,
        receiver_phone: String,
        amount: Decimal,
        charge: Decimal,
        pickup_code_hash: String,
        shares: CommissionShares,
        initiated_at: DateTime<Utc>,
    },

    /// Remittance cash-out at the paying branch (collection)
    RemittancePaid {
        remittance_id: Uuid,
        paying_teller_id: Uuid,
        commission: CommissionSplit,
        paid_at: DateTime<Utc>,
    },

    /// Sender cancelled before collection; principal and charge refunded
    RemittanceWithdrawn {
        remittance_id: Uuid,
        refund_total: Decimal,
        withdrawn_at: DateTime<Utc>,
    },

    /// Back office rejected a pending remittance
    RemittanceRejected {
        remittance_id: Uuid,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}

impl RemittanceEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            RemittanceEvent::RemittanceInitiated { .. } => "RemittanceInitiated",
            RemittanceEvent::RemittancePaid { .. } => "RemittancePaid",
            RemittanceEvent::RemittanceWithdrawn { .. } => "RemittanceWithdrawn",
            RemittanceEvent::RemittanceRejected { .. } => "RemittanceRejected",
        }
    }

    /// Get the remittance ID this event relates to
    pub fn remittance_id(&self) -> Uuid {
        match self {
            RemittanceEvent::RemittanceInitiated { remittance_id, .. } => *remittance_id,
            RemittanceEvent::RemittancePaid { remittance_id, .. } => *remittance_id,
            RemittanceEvent::RemittanceWithdrawn { remittance_id, .. } => *remittance_id,
            RemittanceEvent::RemittanceRejected { remittance_id, .. } => *remittance_id,
        }
    }
}

/// Reasons why a single posting in a bulk batch might fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingFailureReason {
    /// Till doesn't hold enough cash for a dispense
    InsufficientTillCash,

    /// Till is short of one denomination
    InsufficientDenomination,

    /// Denominated cash doesn't add up to the posted amount
    DrawerAmountMismatch,

    /// Amount is zero, negative or out of bounds
    InvalidAmount,

    /// Teller is closed
    TellerClosed,

    /// Concurrent modification detected
    ConcurrencyConflict,

    /// Internal system error
    InternalError,
}

impl std::fmt::Display for PostingFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostingFailureReason::InsufficientTillCash => write!(f, "Insufficient till cash"),
            PostingFailureReason::InsufficientDenomination => {
                write!(f, "Insufficient denomination")
            }
            PostingFailureReason::DrawerAmountMismatch => {
                write!(f, "Drawer does not match amount")
            }
            PostingFailureReason::InvalidAmount => write!(f, "Invalid amount"),
            PostingFailureReason::TellerClosed => write!(f, "Teller is closed"),
            PostingFailureReason::ConcurrencyConflict => write!(f, "Concurrency conflict"),
            PostingFailureReason::InternalError => write!(f, "Internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_teller_event_serialization() {
        let drawer = CashDrawer::from_lines([(dec!(1000), 2), (dec!(500), 1)]).unwrap();
        let event = TellerEvent::CashDeposited {
            teller_id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            amount: dec!(2500),
            drawer,
            description: "Counter deposit".to_string(),
            deposited_at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("CashDeposited"));

        let deserialized: TellerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.event_type(), deserialized.event_type());
    }

    #[test]
    fn test_remittance_event_serialization() {
        let shares =
            CommissionShares::new(dec!(40), dec!(40), dec!(20)).unwrap();
        let event = RemittanceEvent::RemittanceInitiated {
            remittance_id: Uuid::new_v4(),
            reference: "RMT-20260830-000001".to_string(),
            source_branch_id: Uuid::new_v4(),
            paying_branch_id: Uuid::new_v4(),
            source_teller_id: Uuid::new_v4(),
            sender_name: "Abel".to_string(),
            sender_phone: "+251900000001".to_string(),
            receiver_name: "Bethel".to_string(),
            receiver_phone: "+251900000002".to_string(),
            amount: dec!(5000),
            charge: dec!(50),
            pickup_code_hash: "deadbeef".to_string(),
            shares,
            initiated_at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: RemittanceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "RemittanceInitiated");
        assert_eq!(deserialized.remittance_id(), event.remittance_id());
    }

    #[test]
    fn test_posting_failure_reason() {
        let reason = PostingFailureReason::InsufficientDenomination;
        let json = serde_json::to_string(&reason).unwrap();
        assert_eq!(json, r#""insufficient_denomination""#);

        let deserialized: PostingFailureReason = serde_json::from_str(&json).unwrap();
        assert_eq!(reason, deserialized);
    }
}
