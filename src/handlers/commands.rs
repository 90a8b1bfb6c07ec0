//! Command definitions
//!
//! Commands represent intentions to change the system state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CashDrawer, CommissionSplit, DomainError, PostingFailureReason};

/// One denomination line of a tendered/dispensed drawer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawerLine {
    pub denomination: Decimal,
    pub count: u32,
}

/// Convert wire-form drawer lines into a validated [`CashDrawer`]
pub fn drawer_from_lines(lines: &[DrawerLine]) -> Result<CashDrawer, DomainError> {
    CashDrawer::from_lines(lines.iter().map(|l| (l.denomination, l.count)))
}

/// Command to open a teller position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTellerCommand {
    pub teller_id: Uuid,
    pub branch_id: Uuid,
    pub operator_user_id: Uuid,
    pub name: String,
}

impl OpenTellerCommand {
    pub fn new(teller_id: Uuid, branch_id: Uuid, operator_user_id: Uuid, name: String) -> Self {
        Self {
            teller_id,
            branch_id,
            operator_user_id,
            name,
        }
    }
}

/// Result of opening a teller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTellerResult {
    pub teller_id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
}

/// Result of closing a teller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseTellerResult {
    pub teller_id: Uuid,
    pub closing_total: Decimal,
}

/// Command to move cash between vault and till
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionTillCommand {
    pub teller_id: Uuid,
    pub lines: Vec<DrawerLine>,
    pub vault_reference: String,
}

impl ProvisionTillCommand {
    pub fn new(teller_id: Uuid, lines: Vec<DrawerLine>, vault_reference: String) -> Self {
        Self {
            teller_id,
            lines,
            vault_reference,
        }
    }
}

/// Result of a till provisioning or return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionTillResult {
    pub teller_id: Uuid,
    pub moved_total: Decimal,
    pub till_total: Decimal,
}

/// Direction of a counter cash movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashDirection {
    CashIn,
    CashOut,
}

/// Command to post a single counter cash movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashCommand {
    pub teller_id: Uuid,
    /// Amount as string for precise decimal
    pub amount: String,
    pub lines: Vec<DrawerLine>,
    pub description: Option<String>,
}

impl CashCommand {
    pub fn new(teller_id: Uuid, amount: String, lines: Vec<DrawerLine>) -> Self {
        Self {
            teller_id,
            amount,
            lines,
            description: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

/// Result of a posted cash movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashResult {
    pub transaction_id: Uuid,
    pub teller_id: Uuid,
    pub amount: Decimal,
    pub till_total: Decimal,
}

/// One item of a bulk cash batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCashItem {
    pub direction: CashDirection,
    pub amount: String,
    pub lines: Vec<DrawerLine>,
    pub description: Option<String>,
}

/// Command to process a batch of cash movements against one teller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCashCommand {
    pub teller_id: Uuid,
    pub items: Vec<BulkCashItem>,
}

/// Outcome of one bulk item; item failures do not abort the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemOutcome {
    pub index: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<PostingFailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BulkItemOutcome {
    pub fn posted(index: usize, transaction_id: Uuid) -> Self {
        Self {
            index,
            status: "posted".to_string(),
            transaction_id: Some(transaction_id),
            reason: None,
            message: None,
        }
    }

    pub fn failed(index: usize, reason: PostingFailureReason, message: String) -> Self {
        Self {
            index,
            status: "failed".to_string(),
            transaction_id: None,
            reason: Some(reason),
            message: Some(message),
        }
    }
}

/// Result of a bulk batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCashResult {
    pub teller_id: Uuid,
    pub posted: usize,
    pub failed: usize,
    pub outcomes: Vec<BulkItemOutcome>,
    pub till_total: Decimal,
}

/// Command to initiate a remittance (cash-in at the source branch)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRemittanceCommand {
    pub source_teller_id: Uuid,
    pub paying_branch_id: Uuid,
    pub sender_name: String,
    pub sender_phone: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    /// Principal as string for precise decimal
    pub amount: String,
    /// Service charge as string
    pub charge: String,
    /// Cash tendered: must denominate principal + charge
    pub lines: Vec<DrawerLine>,
}

/// Result of initiating a remittance.
/// The pickup code is returned exactly once, here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRemittanceResult {
    pub remittance_id: Uuid,
    pub reference: String,
    pub pickup_code: String,
    pub amount: Decimal,
    pub charge: Decimal,
    pub status: String,
}

/// Command to pay out a remittance at the paying branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRemittanceCommand {
    pub reference: String,
    pub pickup_code: String,
    pub paying_teller_id: Uuid,
    /// Cash dispensed: must denominate the principal
    pub lines: Vec<DrawerLine>,
}

/// Result of a remittance payout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRemittanceResult {
    pub remittance_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub commission: CommissionSplit,
    pub status: String,
}

/// Command to withdraw (sender-cancel) a pending remittance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRemittanceCommand {
    pub reference: String,
    pub refunding_teller_id: Uuid,
    /// Cash refunded: must denominate principal + charge
    pub lines: Vec<DrawerLine>,
}

/// Result of a remittance withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRemittanceResult {
    pub remittance_id: Uuid,
    pub reference: String,
    pub refund_total: Decimal,
    pub status: String,
}

/// Command to reject a pending remittance (back office)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRemittanceCommand {
    pub reference: String,
    pub reason: String,
}

/// Result of a remittance rejection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRemittanceResult {
    pub remittance_id: Uuid,
    pub reference: String,
    pub status: String,
}
