//! Teller Lifecycle Handlers
//!
//! Opening and closing teller positions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Teller};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::event_store::{AggregateOperation, EventStore};

use super::{CloseTellerResult, OpenTellerCommand, OpenTellerResult};

/// Handler for opening a teller position
pub struct OpenTellerHandler {
    event_store: EventStore,
}

impl OpenTellerHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool),
        }
    }

    /// Execute the open command
    pub async fn execute(
        &self,
        command: OpenTellerCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<OpenTellerResult, AppError> {
        if command.name.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Teller name must not be empty".to_string(),
            ));
        }

        // Reject reopening an existing position
        if self
            .event_store
            .load_aggregate::<Teller>(command.teller_id)
            .await?
            .is_some()
        {
            return Err(AppError::InvalidRequest(format!(
                "Teller {} already exists",
                command.teller_id
            )));
        }

        let (teller, event) = Teller::open(
            command.teller_id,
            command.branch_id,
            command.operator_user_id,
            command.name.clone(),
        );

        let operation = AggregateOperation::new(
            Teller::aggregate_type(),
            command.teller_id,
            0,
            event.event_type(),
            &event,
        )?;

        self.event_store
            .append_atomic(vec![operation], idempotency_key, context)
            .await?;

        tracing::info!(
            teller_id = %teller.id(),
            branch_id = %teller.branch_id(),
            "Teller opened"
        );

        Ok(OpenTellerResult {
            teller_id: command.teller_id,
            branch_id: command.branch_id,
            name: command.name,
        })
    }
}

/// Handler for closing a teller position
pub struct CloseTellerHandler {
    event_store: EventStore,
}

impl CloseTellerHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool),
        }
    }

    /// Execute the close command
    pub async fn execute(
        &self,
        teller_id: Uuid,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<CloseTellerResult, AppError> {
        let teller: Teller = self
            .event_store
            .load_aggregate(teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(teller_id.to_string()))?;

        let event = teller.close()?;

        let operation = AggregateOperation::new(
            Teller::aggregate_type(),
            teller_id,
            teller.version(),
            event.event_type(),
            &event,
        )?;

        self.event_store
            .append_atomic(vec![operation], idempotency_key, context)
            .await?;

        let closing_total = teller.till().total();
        let teller = teller.apply(event);
        self.event_store.save_snapshot_if_needed(&teller).await?;

        tracing::info!(
            teller_id = %teller_id,
            closing_total = %closing_total,
            "Teller closed"
        );

        Ok(CloseTellerResult {
            teller_id,
            closing_total,
        })
    }
}
