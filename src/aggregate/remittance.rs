//! Remittance Aggregate
//!
//! A remittance is a cross-branch money transfer with a lifecycle:
//! Pending -> Paid | Withdrawn | Rejected. Collection is at-most-once: a
//! Paid remittance can never be paid again, and every payout checks the
//! designated branch and the pickup code hash before cash moves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{
    Amount, CommissionShares, DomainError, RemittanceEvent, RemittanceStatus,
};

use super::Aggregate;

/// Hash a pickup code for storage and comparison.
/// The clear code is only ever returned once, at initiation.
pub fn hash_pickup_code(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    hex::encode(digest)
}

/// Remittance Aggregate
///
/// State is derived from events, never directly mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remittance {
    /// Unique remittance ID
    id: Uuid,

    /// Human-facing reference code
    reference: String,

    /// Branch that collected the cash
    source_branch_id: Uuid,

    /// Branch designated to pay out
    paying_branch_id: Uuid,

    /// Teller that posted the cash-in
    source_teller_id: Uuid,

    sender_name: String,
    sender_phone: String,
    receiver_name: String,
    receiver_phone: String,

    /// Principal amount
    amount: rust_decimal::Decimal,

    /// Service charge collected on top of the principal
    charge: rust_decimal::Decimal,

    /// Commission shares snapshotted at initiation
    shares: CommissionShares,

    /// sha256 of the pickup code (never stored in clear)
    pickup_code_hash: String,

    /// Lifecycle status
    status: RemittanceStatus,

    /// Current version (number of events applied)
    version: i64,

    /// When the remittance was initiated
    initiated_at: Option<DateTime<Utc>>,
}

impl Default for Remittance {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            reference: String::new(),
            source_branch_id: Uuid::nil(),
            paying_branch_id: Uuid::nil(),
            source_teller_id: Uuid::nil(),
            sender_name: String::new(),
            sender_phone: String::new(),
            receiver_name: String::new(),
            receiver_phone: String::new(),
            amount: rust_decimal::Decimal::ZERO,
            charge: rust_decimal::Decimal::ZERO,
            shares: CommissionShares {
                source_pct: rust_decimal::Decimal::ZERO,
                paying_pct: rust_decimal::Decimal::ZERO,
                head_office_pct: rust_decimal::Decimal::ONE_HUNDRED,
            },
            pickup_code_hash: String::new(),
            status: RemittanceStatus::Pending,
            version: 0,
            initiated_at: None,
        }
    }
}

/// Parameters for initiating a remittance
#[derive(Debug, Clone)]
pub struct InitiateRemittance {
    pub remittance_id: Uuid,
    pub reference: String,
    pub source_branch_id: Uuid,
    pub paying_branch_id: Uuid,
    pub source_teller_id: Uuid,
    pub sender_name: String,
    pub sender_phone: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub amount: Amount,
    pub charge: rust_decimal::Decimal,
    pub pickup_code: String,
    pub shares: CommissionShares,
}

impl Remittance {
    /// Initiate a remittance (cash-in at the source branch)
    pub fn initiate(params: InitiateRemittance) -> Result<(Self, RemittanceEvent), DomainError> {
        if params.source_branch_id == params.paying_branch_id {
            return Err(DomainError::SameBranchRemittance);
        }
        if params.charge < rust_decimal::Decimal::ZERO {
            return Err(DomainError::InvalidAmount(format!(
                "Charge must not be negative (got {})",
                params.charge
            )));
        }

        let now = Utc::now();
        let pickup_code_hash = hash_pickup_code(&params.pickup_code);

        let event = RemittanceEvent::RemittanceInitiated {
            remittance_id: params.remittance_id,
            reference: params.reference.clone(),
            source_branch_id: params.source_branch_id,
            paying_branch_id: params.paying_branch_id,
            source_teller_id: params.source_teller_id,
            sender_name: params.sender_name.clone(),
            sender_phone: params.sender_phone.clone(),
            receiver_name: params.receiver_name.clone(),
            receiver_phone: params.receiver_phone.clone(),
            amount: params.amount.value(),
            charge: params.charge,
            pickup_code_hash: pickup_code_hash.clone(),
            shares: params.shares,
            initiated_at: now,
        };

        let remittance = Self {
            id: params.remittance_id,
            reference: params.reference,
            source_branch_id: params.source_branch_id,
            paying_branch_id: params.paying_branch_id,
            source_teller_id: params.source_teller_id,
            sender_name: params.sender_name,
            sender_phone: params.sender_phone,
            receiver_name: params.receiver_name,
            receiver_phone: params.receiver_phone,
            amount: params.amount.value(),
            charge: params.charge,
            shares: params.shares,
            pickup_code_hash,
            status: RemittanceStatus::Pending,
            version: 1,
            initiated_at: Some(now),
        };

        Ok((remittance, event))
    }

    /// Pay out the remittance (cash-out at the paying branch).
    ///
    /// Guards, in order: lifecycle (at-most-once collection), designated
    /// paying branch, pickup code hash.
    pub fn pay(
        &self,
        pickup_code: &str,
        paying_branch_id: Uuid,
        paying_teller_id: Uuid,
    ) -> Result<RemittanceEvent, DomainError> {
        self.ensure_transition(RemittanceStatus::Paid)?;

        if paying_branch_id != self.paying_branch_id {
            return Err(DomainError::WrongPayingBranch);
        }
        if hash_pickup_code(pickup_code) != self.pickup_code_hash {
            return Err(DomainError::WrongPickupCode);
        }

        let commission = self.shares.split(self.charge)?;

        Ok(RemittanceEvent::RemittancePaid {
            remittance_id: self.id,
            paying_teller_id,
            commission,
            paid_at: Utc::now(),
        })
    }

    /// Sender cancels before collection. The principal and the full charge
    /// are refunded at the source branch.
    pub fn withdraw(&self, requesting_branch_id: Uuid) -> Result<RemittanceEvent, DomainError> {
        self.ensure_transition(RemittanceStatus::Withdrawn)?;

        if requesting_branch_id != self.source_branch_id {
            return Err(DomainError::WrongSourceBranch);
        }

        Ok(RemittanceEvent::RemittanceWithdrawn {
            remittance_id: self.id,
            refund_total: self.amount + self.charge,
            withdrawn_at: Utc::now(),
        })
    }

    /// Back-office rejection of a pending remittance
    pub fn reject(&self, reason: String) -> Result<RemittanceEvent, DomainError> {
        self.ensure_transition(RemittanceStatus::Rejected)?;

        Ok(RemittanceEvent::RemittanceRejected {
            remittance_id: self.id,
            reason,
            rejected_at: Utc::now(),
        })
    }

    fn ensure_transition(&self, target: RemittanceStatus) -> Result<(), DomainError> {
        if self.status == RemittanceStatus::Paid {
            return Err(DomainError::AlreadyCollected);
        }
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn source_branch_id(&self) -> Uuid {
        self.source_branch_id
    }

    pub fn paying_branch_id(&self) -> Uuid {
        self.paying_branch_id
    }

    pub fn source_teller_id(&self) -> Uuid {
        self.source_teller_id
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn sender_phone(&self) -> &str {
        &self.sender_phone
    }

    pub fn receiver_name(&self) -> &str {
        &self.receiver_name
    }

    pub fn receiver_phone(&self) -> &str {
        &self.receiver_phone
    }

    pub fn amount(&self) -> rust_decimal::Decimal {
        self.amount
    }

    pub fn charge(&self) -> rust_decimal::Decimal {
        self.charge
    }

    pub fn shares(&self) -> CommissionShares {
        self.shares
    }

    pub fn status(&self) -> RemittanceStatus {
        self.status
    }

    pub fn initiated_at(&self) -> Option<DateTime<Utc>> {
        self.initiated_at
    }
}

impl Aggregate for Remittance {
    type Event = RemittanceEvent;

    fn aggregate_type() -> &'static str {
        "Remittance"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            RemittanceEvent::RemittanceInitiated {
                remittance_id,
                reference,
                source_branch_id,
                paying_branch_id,
                source_teller_id,
                sender_name,
                sender_phone,
                receiver_name,
                receiver_phone,
                amount,
                charge,
                pickup_code_hash,
                shares,
                initiated_at,
            } => {
                self.id = remittance_id;
                self.reference = reference;
                self.source_branch_id = source_branch_id;
                self.paying_branch_id = paying_branch_id;
                self.source_teller_id = source_teller_id;
                self.sender_name = sender_name;
                self.sender_phone = sender_phone;
                self.receiver_name = receiver_name;
                self.receiver_phone = receiver_phone;
                self.amount = amount;
                self.charge = charge;
                self.pickup_code_hash = pickup_code_hash;
                self.shares = shares;
                self.status = RemittanceStatus::Pending;
                self.initiated_at = Some(initiated_at);
            }
            RemittanceEvent::RemittancePaid { .. } => {
                self.status = RemittanceStatus::Paid;
            }
            RemittanceEvent::RemittanceWithdrawn { .. } => {
                self.status = RemittanceStatus::Withdrawn;
            }
            RemittanceEvent::RemittanceRejected { .. } => {
                self.status = RemittanceStatus::Rejected;
            }
        }

        self.version += 1;
        self
    }
}
