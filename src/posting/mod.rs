//! Accounting postings
//!
//! Every settlement produces a balanced double-entry journal against the
//! internal chart of accounts. Postings are validated (debits == credits)
//! before the projection layer writes them to `ledger_entries`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::CommissionSplit;

/// Internal chart of accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "account", rename_all = "snake_case")]
pub enum LedgerAccount {
    /// Cash sitting in a branch's tills
    TellerCash { branch_id: Uuid },
    /// Cash sitting in a branch's vault
    VaultCash { branch_id: Uuid },
    /// Liability for initiated, not-yet-settled remittances
    RemittancePayable,
    /// Commission income earned by a branch
    CommissionIncome { branch_id: Uuid },
    /// Commission income earned by head office
    HeadOfficeCommission,
    /// Due-to/due-from position against another branch
    InterBranch { branch_id: Uuid },
    /// Counter-side settlement account for plain cash-in/cash-out
    CustomerSettlement,
}

impl LedgerAccount {
    /// Stable account code used in `ledger_entries`.
    pub fn code(&self) -> String {
        match self {
            LedgerAccount::TellerCash { branch_id } => format!("teller_cash:{}", branch_id),
            LedgerAccount::VaultCash { branch_id } => format!("vault_cash:{}", branch_id),
            LedgerAccount::RemittancePayable => "remittance_payable".to_string(),
            LedgerAccount::CommissionIncome { branch_id } => {
                format!("commission_income:{}", branch_id)
            }
            LedgerAccount::HeadOfficeCommission => "head_office_commission".to_string(),
            LedgerAccount::InterBranch { branch_id } => format!("inter_branch:{}", branch_id),
            LedgerAccount::CustomerSettlement => "customer_settlement".to_string(),
        }
    }
}

/// Posting side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySide::Debit => "debit",
            EntrySide::Credit => "credit",
        }
    }
}

/// One line of a journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingLine {
    pub account: LedgerAccount,
    pub side: EntrySide,
    pub amount: Decimal,
}

/// Posting validation errors
#[derive(Debug, thiserror::Error)]
pub enum PostingError {
    #[error("Posting is not balanced: debits {debits}, credits {credits}")]
    Unbalanced { debits: Decimal, credits: Decimal },

    #[error("Invalid posting line: {0}")]
    InvalidLine(String),
}

/// A balanced double-entry journal for one settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingPosting {
    pub journal_id: Uuid,
    pub description: String,
    pub lines: Vec<PostingLine>,
}

impl AccountingPosting {
    /// Assemble and validate a posting. Zero-amount lines are dropped
    /// (a commission leg can legitimately round to zero), negative lines
    /// are rejected, and the remainder must balance.
    pub fn new(
        journal_id: Uuid,
        description: impl Into<String>,
        lines: Vec<PostingLine>,
    ) -> Result<Self, PostingError> {
        let mut kept = Vec::with_capacity(lines.len());
        for line in lines {
            if line.amount < Decimal::ZERO {
                return Err(PostingError::InvalidLine(format!(
                    "Negative amount {} on {}",
                    line.amount,
                    line.account.code()
                )));
            }
            if line.amount > Decimal::ZERO {
                kept.push(line);
            }
        }

        let posting = Self {
            journal_id,
            description: description.into(),
            lines: kept,
        };

        let debits = posting.total_debits();
        let credits = posting.total_credits();
        if debits != credits {
            return Err(PostingError::Unbalanced { debits, credits });
        }

        Ok(posting)
    }

    pub fn total_debits(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.side == EntrySide::Debit)
            .map(|l| l.amount)
            .sum()
    }

    pub fn total_credits(&self) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.side == EntrySide::Credit)
            .map(|l| l.amount)
            .sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    // =========================================================================
    // Builders — one per settlement kind
    // =========================================================================

    /// Counter cash-in: cash enters the till.
    pub fn cash_in(
        journal_id: Uuid,
        branch_id: Uuid,
        amount: Decimal,
    ) -> Result<Self, PostingError> {
        Self::new(
            journal_id,
            "Counter cash-in",
            vec![
                debit(LedgerAccount::TellerCash { branch_id }, amount),
                credit(LedgerAccount::CustomerSettlement, amount),
            ],
        )
    }

    /// Counter cash-out: cash leaves the till.
    pub fn cash_out(
        journal_id: Uuid,
        branch_id: Uuid,
        amount: Decimal,
    ) -> Result<Self, PostingError> {
        Self::new(
            journal_id,
            "Counter cash-out",
            vec![
                debit(LedgerAccount::CustomerSettlement, amount),
                credit(LedgerAccount::TellerCash { branch_id }, amount),
            ],
        )
    }

    /// Till provisioning: vault -> till within one branch.
    pub fn till_provision(
        journal_id: Uuid,
        branch_id: Uuid,
        amount: Decimal,
    ) -> Result<Self, PostingError> {
        Self::new(
            journal_id,
            "Till provisioning",
            vec![
                debit(LedgerAccount::TellerCash { branch_id }, amount),
                credit(LedgerAccount::VaultCash { branch_id }, amount),
            ],
        )
    }

    /// Till return: till -> vault within one branch.
    pub fn till_return(
        journal_id: Uuid,
        branch_id: Uuid,
        amount: Decimal,
    ) -> Result<Self, PostingError> {
        Self::new(
            journal_id,
            "Till return to vault",
            vec![
                debit(LedgerAccount::VaultCash { branch_id }, amount),
                credit(LedgerAccount::TellerCash { branch_id }, amount),
            ],
        )
    }

    /// Remittance initiation at the source branch.
    ///
    /// The till takes principal + charge. The principal becomes a payable;
    /// the charge is recognized per the commission split, with the paying
    /// branch's leg parked on the inter-branch account until payout.
    pub fn remittance_initiated(
        journal_id: Uuid,
        source_branch_id: Uuid,
        paying_branch_id: Uuid,
        amount: Decimal,
        charge: Decimal,
        split: &CommissionSplit,
    ) -> Result<Self, PostingError> {
        Self::new(
            journal_id,
            "Remittance initiated",
            vec![
                debit(
                    LedgerAccount::TellerCash {
                        branch_id: source_branch_id,
                    },
                    amount + charge,
                ),
                credit(LedgerAccount::RemittancePayable, amount),
                credit(
                    LedgerAccount::CommissionIncome {
                        branch_id: source_branch_id,
                    },
                    split.source,
                ),
                credit(
                    LedgerAccount::InterBranch {
                        branch_id: paying_branch_id,
                    },
                    split.paying,
                ),
                credit(LedgerAccount::HeadOfficeCommission, split.head_office),
            ],
        )
    }

    /// Remittance payout at the paying branch.
    ///
    /// The payable is extinguished against the paying till, and the parked
    /// inter-branch leg settles into the paying branch's commission income.
    pub fn remittance_paid(
        journal_id: Uuid,
        paying_branch_id: Uuid,
        amount: Decimal,
        split: &CommissionSplit,
    ) -> Result<Self, PostingError> {
        Self::new(
            journal_id,
            "Remittance paid",
            vec![
                debit(LedgerAccount::RemittancePayable, amount),
                credit(
                    LedgerAccount::TellerCash {
                        branch_id: paying_branch_id,
                    },
                    amount,
                ),
                debit(
                    LedgerAccount::InterBranch {
                        branch_id: paying_branch_id,
                    },
                    split.paying,
                ),
                credit(
                    LedgerAccount::CommissionIncome {
                        branch_id: paying_branch_id,
                    },
                    split.paying,
                ),
            ],
        )
    }

    /// Remittance withdrawal: full reversal at the source branch,
    /// charge refunded in full.
    pub fn remittance_withdrawn(
        journal_id: Uuid,
        source_branch_id: Uuid,
        paying_branch_id: Uuid,
        amount: Decimal,
        charge: Decimal,
        split: &CommissionSplit,
    ) -> Result<Self, PostingError> {
        Self::new(
            journal_id,
            "Remittance withdrawn",
            vec![
                debit(LedgerAccount::RemittancePayable, amount),
                debit(
                    LedgerAccount::CommissionIncome {
                        branch_id: source_branch_id,
                    },
                    split.source,
                ),
                debit(
                    LedgerAccount::InterBranch {
                        branch_id: paying_branch_id,
                    },
                    split.paying,
                ),
                debit(LedgerAccount::HeadOfficeCommission, split.head_office),
                credit(
                    LedgerAccount::TellerCash {
                        branch_id: source_branch_id,
                    },
                    amount + charge,
                ),
            ],
        )
    }
}

fn debit(account: LedgerAccount, amount: Decimal) -> PostingLine {
    PostingLine {
        account,
        side: EntrySide::Debit,
        amount,
    }
}

fn credit(account: LedgerAccount, amount: Decimal) -> PostingLine {
    PostingLine {
        account,
        side: EntrySide::Credit,
        amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CommissionShares;
    use rust_decimal_macros::dec;

    fn split(charge: Decimal) -> CommissionSplit {
        CommissionShares::new(dec!(40), dec!(40), dec!(20))
            .unwrap()
            .split(charge)
            .unwrap()
    }

    #[test]
    fn test_cash_in_is_balanced() {
        let posting = AccountingPosting::cash_in(Uuid::new_v4(), Uuid::new_v4(), dec!(500)).unwrap();
        assert!(posting.is_balanced());
        assert_eq!(posting.lines.len(), 2);
    }

    #[test]
    fn test_unbalanced_posting_rejected() {
        let result = AccountingPosting::new(
            Uuid::new_v4(),
            "broken",
            vec![
                debit(LedgerAccount::CustomerSettlement, dec!(100)),
                credit(LedgerAccount::RemittancePayable, dec!(90)),
            ],
        );
        assert!(matches!(result, Err(PostingError::Unbalanced { .. })));
    }

    #[test]
    fn test_negative_line_rejected() {
        let result = AccountingPosting::new(
            Uuid::new_v4(),
            "broken",
            vec![
                debit(LedgerAccount::CustomerSettlement, dec!(-100)),
                credit(LedgerAccount::RemittancePayable, dec!(-100)),
            ],
        );
        assert!(matches!(result, Err(PostingError::InvalidLine(_))));
    }

    #[test]
    fn test_remittance_initiated_posting() {
        let source = Uuid::new_v4();
        let paying = Uuid::new_v4();
        let posting = AccountingPosting::remittance_initiated(
            Uuid::new_v4(),
            source,
            paying,
            dec!(5000),
            dec!(50),
            &split(dec!(50)),
        )
        .unwrap();

        assert!(posting.is_balanced());
        assert_eq!(posting.total_debits(), dec!(5050));
        // Payable + three commission legs
        assert_eq!(posting.lines.len(), 5);
    }

    #[test]
    fn test_remittance_paid_posting() {
        let paying = Uuid::new_v4();
        let posting = AccountingPosting::remittance_paid(
            Uuid::new_v4(),
            paying,
            dec!(5000),
            &split(dec!(50)),
        )
        .unwrap();

        assert!(posting.is_balanced());
        assert_eq!(posting.total_debits(), dec!(5020));
    }

    #[test]
    fn test_remittance_withdrawn_reverses_initiation() {
        let source = Uuid::new_v4();
        let paying = Uuid::new_v4();
        let split = split(dec!(50));

        let posting = AccountingPosting::remittance_withdrawn(
            Uuid::new_v4(),
            source,
            paying,
            dec!(5000),
            dec!(50),
            &split,
        )
        .unwrap();

        assert!(posting.is_balanced());
        // Till hands back principal + full charge
        assert_eq!(posting.total_credits(), dec!(5050));
    }

    #[test]
    fn test_zero_commission_legs_are_dropped() {
        let posting = AccountingPosting::remittance_initiated(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(5000),
            Decimal::ZERO,
            &split(Decimal::ZERO),
        )
        .unwrap();

        assert!(posting.is_balanced());
        // Only till and payable lines survive a zero charge
        assert_eq!(posting.lines.len(), 2);
    }

    #[test]
    fn test_account_codes() {
        let branch = Uuid::nil();
        assert_eq!(
            LedgerAccount::TellerCash { branch_id: branch }.code(),
            format!("teller_cash:{}", branch)
        );
        assert_eq!(LedgerAccount::RemittancePayable.code(), "remittance_payable");
        assert_eq!(EntrySide::Debit.as_str(), "debit");
    }
}
