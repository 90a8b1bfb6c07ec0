//! Till Provisioning Handler
//!
//! Cash movements between the branch vault and a teller's till,
//! recorded in the provisioning history.

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Teller};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::event_store::{AggregateOperation, EventStore};
use crate::posting::AccountingPosting;
use crate::projection::ProjectionService;

use super::{drawer_from_lines, ProvisionTillCommand, ProvisionTillResult};

/// Direction of a vault movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VaultDirection {
    Provision,
    Return,
}

impl VaultDirection {
    fn as_str(&self) -> &'static str {
        match self {
            VaultDirection::Provision => "provision",
            VaultDirection::Return => "return",
        }
    }
}

/// Handler for till provisioning and returns
pub struct ProvisionTillHandler {
    event_store: EventStore,
    projection: ProjectionService,
}

impl ProvisionTillHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool),
        }
    }

    /// Move cash from the vault into the till
    pub async fn provision(
        &self,
        command: ProvisionTillCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<ProvisionTillResult, AppError> {
        self.execute(command, VaultDirection::Provision, idempotency_key, context)
            .await
    }

    /// Return cash from the till to the vault
    pub async fn return_to_vault(
        &self,
        command: ProvisionTillCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<ProvisionTillResult, AppError> {
        self.execute(command, VaultDirection::Return, idempotency_key, context)
            .await
    }

    async fn execute(
        &self,
        command: ProvisionTillCommand,
        direction: VaultDirection,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<ProvisionTillResult, AppError> {
        if command.vault_reference.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Vault reference must not be empty".to_string(),
            ));
        }

        let drawer = drawer_from_lines(&command.lines)?;

        let teller: Teller = self
            .event_store
            .load_aggregate(command.teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(command.teller_id.to_string()))?;

        let event = match direction {
            VaultDirection::Provision => {
                teller.provision(drawer.clone(), command.vault_reference.clone())?
            }
            VaultDirection::Return => {
                teller.return_to_vault(drawer.clone(), command.vault_reference.clone())?
            }
        };

        let operation = AggregateOperation::new(
            Teller::aggregate_type(),
            command.teller_id,
            teller.version(),
            event.event_type(),
            &event,
        )?;

        let outcome = self
            .event_store
            .append_atomic(vec![operation], idempotency_key, context)
            .await?;

        if outcome.replayed {
            // Loaded state already reflects the original movement
            return Ok(ProvisionTillResult {
                teller_id: command.teller_id,
                moved_total: drawer.total(),
                till_total: teller.till().total(),
            });
        }

        let journal_id = Uuid::new_v4();
        let posting = match direction {
            VaultDirection::Provision => {
                AccountingPosting::till_provision(journal_id, teller.branch_id(), drawer.total())?
            }
            VaultDirection::Return => {
                AccountingPosting::till_return(journal_id, teller.branch_id(), drawer.total())?
            }
        };

        let teller = teller.apply(event);

        self.projection
            .apply_provisioning(
                &teller,
                &drawer,
                direction.as_str(),
                &command.vault_reference,
                outcome.event_ids[0],
                &posting,
            )
            .await?;

        self.event_store.save_snapshot_if_needed(&teller).await?;

        tracing::info!(
            teller_id = %command.teller_id,
            direction = direction.as_str(),
            moved_total = %drawer.total(),
            vault_reference = %command.vault_reference,
            "Till movement recorded"
        );

        Ok(ProvisionTillResult {
            teller_id: command.teller_id,
            moved_total: drawer.total(),
            till_total: teller.till().total(),
        })
    }
}
