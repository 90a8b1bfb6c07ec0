//! Teller Aggregate
//!
//! A teller is an operational cash-handling position with a denominated till.
//! State is derived from events, never directly mutated. Every command checks
//! the till invariants (drawer matches amount, denomination sufficiency)
//! before an event is produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, CashDrawer, DomainError, TellerEvent};

use super::Aggregate;

/// Teller position status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TellerStatus {
    Open,
    Closed,
}

impl Default for TellerStatus {
    fn default() -> Self {
        Self::Closed
    }
}

/// Teller Aggregate
///
/// Tracks a till as per-denomination counts. Cash only enters through
/// provisioning and deposits, and only leaves through dispenses and vault
/// returns, so the till total always equals the sum of applied movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teller {
    /// Unique teller ID
    id: Uuid,

    /// Branch this teller belongs to
    branch_id: Uuid,

    /// Operating user
    operator_user_id: Uuid,

    /// Display name (counter 1, drive-through, vault teller...)
    name: String,

    /// Per-denomination till contents (derived from events)
    till: CashDrawer,

    /// Position status
    status: TellerStatus,

    /// Current version (number of events applied)
    version: i64,

    /// When the position was opened
    opened_at: Option<DateTime<Utc>>,
}

impl Default for Teller {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            branch_id: Uuid::nil(),
            operator_user_id: Uuid::nil(),
            name: String::new(),
            till: CashDrawer::new(),
            status: TellerStatus::Closed,
            version: 0,
            opened_at: None,
        }
    }
}

impl Teller {
    /// Open a new teller position and generate the opening event
    pub fn open(
        teller_id: Uuid,
        branch_id: Uuid,
        operator_user_id: Uuid,
        name: String,
    ) -> (Self, TellerEvent) {
        let now = Utc::now();

        let event = TellerEvent::TellerOpened {
            teller_id,
            branch_id,
            operator_user_id,
            name: name.clone(),
            opened_at: now,
        };

        let teller = Self {
            id: teller_id,
            branch_id,
            operator_user_id,
            name,
            till: CashDrawer::new(),
            status: TellerStatus::Open,
            version: 1,
            opened_at: Some(now),
        };

        (teller, event)
    }

    /// Provision the till with cash from the vault
    pub fn provision(
        &self,
        drawer: CashDrawer,
        vault_reference: String,
    ) -> Result<TellerEvent, DomainError> {
        self.ensure_open()?;

        if drawer.is_empty() {
            return Err(DomainError::InvalidAmount(
                "Provisioning drawer must not be empty".to_string(),
            ));
        }

        Ok(TellerEvent::TillProvisioned {
            teller_id: self.id,
            drawer,
            vault_reference,
            provisioned_at: Utc::now(),
        })
    }

    /// Return cash from the till to the vault
    pub fn return_to_vault(
        &self,
        drawer: CashDrawer,
        vault_reference: String,
    ) -> Result<TellerEvent, DomainError> {
        self.ensure_open()?;

        if drawer.is_empty() {
            return Err(DomainError::InvalidAmount(
                "Return drawer must not be empty".to_string(),
            ));
        }

        // Sufficiency check per denomination
        self.till.withdraw(&drawer)?;

        Ok(TellerEvent::TillReturned {
            teller_id: self.id,
            drawer,
            vault_reference,
            returned_at: Utc::now(),
        })
    }

    /// Take cash over the counter (cash-in)
    pub fn deposit_cash(
        &self,
        amount: &Amount,
        drawer: CashDrawer,
        transaction_id: Uuid,
        description: String,
    ) -> Result<TellerEvent, DomainError> {
        self.ensure_open()?;
        self.ensure_denominated(amount, &drawer)?;

        Ok(TellerEvent::CashDeposited {
            teller_id: self.id,
            transaction_id,
            amount: amount.value(),
            drawer,
            description,
            deposited_at: Utc::now(),
        })
    }

    /// Pay cash out over the counter (cash-out)
    pub fn dispense_cash(
        &self,
        amount: &Amount,
        drawer: CashDrawer,
        transaction_id: Uuid,
        description: String,
    ) -> Result<TellerEvent, DomainError> {
        self.ensure_open()?;
        self.ensure_denominated(amount, &drawer)?;

        // Coarse check first for a clearer error when the whole till is short
        if self.till.total() < amount.value() {
            return Err(DomainError::insufficient_till_cash(
                amount.value(),
                self.till.total(),
            ));
        }

        // Per-denomination sufficiency
        self.till.withdraw(&drawer)?;

        Ok(TellerEvent::CashDispensed {
            teller_id: self.id,
            transaction_id,
            amount: amount.value(),
            drawer,
            description,
            dispensed_at: Utc::now(),
        })
    }

    /// Close the teller position, recording the closing balance
    pub fn close(&self) -> Result<TellerEvent, DomainError> {
        self.ensure_open()?;

        Ok(TellerEvent::TellerClosed {
            teller_id: self.id,
            closing_drawer: self.till.clone(),
            closed_at: Utc::now(),
        })
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status != TellerStatus::Open {
            return Err(DomainError::TellerClosed);
        }
        Ok(())
    }

    fn ensure_denominated(
        &self,
        amount: &Amount,
        drawer: &CashDrawer,
    ) -> Result<(), DomainError> {
        if !drawer.matches_amount(amount) {
            return Err(DomainError::DrawerAmountMismatch {
                drawer_total: drawer.total(),
                amount: amount.value(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn branch_id(&self) -> Uuid {
        self.branch_id
    }

    pub fn operator_user_id(&self) -> Uuid {
        self.operator_user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn till(&self) -> &CashDrawer {
        &self.till
    }

    pub fn status(&self) -> &TellerStatus {
        &self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == TellerStatus::Open
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }
}

impl Aggregate for Teller {
    type Event = TellerEvent;

    fn aggregate_type() -> &'static str {
        "Teller"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            TellerEvent::TellerOpened {
                teller_id,
                branch_id,
                operator_user_id,
                name,
                opened_at,
            } => {
                self.id = teller_id;
                self.branch_id = branch_id;
                self.operator_user_id = operator_user_id;
                self.name = name;
                self.status = TellerStatus::Open;
                self.opened_at = Some(opened_at);
            }
            TellerEvent::TillProvisioned { drawer, .. }
            | TellerEvent::CashDeposited { drawer, .. } => {
                // Counts were bounds-checked at emission
                if let Ok(till) = self.till.deposit(&drawer) {
                    self.till = till;
                }
            }
            TellerEvent::TillReturned { drawer, .. }
            | TellerEvent::CashDispensed { drawer, .. } => {
                // Sufficiency was checked at emission
                if let Ok(till) = self.till.withdraw(&drawer) {
                    self.till = till;
                }
            }
            TellerEvent::TellerClosed { .. } => {
                self.status = TellerStatus::Closed;
            }
        }

        self.version += 1;
        self
    }
}
