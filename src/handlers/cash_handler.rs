//! Counter Cash Handlers
//!
//! Single cash-in and cash-out postings against a teller's till.

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Teller};
use crate::domain::{Amount, OperationContext, TellerEvent};
use crate::error::AppError;
use crate::event_store::{AggregateOperation, EventStore};
use crate::posting::AccountingPosting;
use crate::projection::ProjectionService;

use super::{drawer_from_lines, CashCommand, CashResult};

/// Recover the transaction id recorded in a previously stored cash event,
/// so a replayed request answers with the same id as the original.
async fn stored_transaction_id(
    event_store: &EventStore,
    event_id: Uuid,
) -> Result<Uuid, AppError> {
    let stored = event_store
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Stored event {} not found", event_id)))?;

    let event: TellerEvent = serde_json::from_value(stored.event_data)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    match event {
        TellerEvent::CashDeposited { transaction_id, .. }
        | TellerEvent::CashDispensed { transaction_id, .. } => Ok(transaction_id),
        other => Err(AppError::Internal(format!(
            "Unexpected replayed event type {}",
            other.event_type()
        ))),
    }
}

/// Handler for counter cash-in
pub struct CashInHandler {
    event_store: EventStore,
    projection: ProjectionService,
}

impl CashInHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool),
        }
    }

    /// Execute the cash-in command
    pub async fn execute(
        &self,
        command: CashCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<CashResult, AppError> {
        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;
        let drawer = drawer_from_lines(&command.lines)?;

        let teller: Teller = self
            .event_store
            .load_aggregate(command.teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(command.teller_id.to_string()))?;

        let transaction_id = Uuid::new_v4();
        let event = teller.deposit_cash(
            &amount,
            drawer,
            transaction_id,
            command
                .description
                .unwrap_or_else(|| "Counter cash-in".to_string()),
        )?;

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
            // Loaded state already reflects the original posting
            let transaction_id =
                stored_transaction_id(&self.event_store, outcome.event_ids[0]).await?;
            return Ok(CashResult {
                transaction_id,
                teller_id: command.teller_id,
                amount: amount.value(),
                till_total: teller.till().total(),
            });
        }

        let posting =
            AccountingPosting::cash_in(transaction_id, teller.branch_id(), amount.value())?;

        let teller = teller.apply(event);

        self.projection
            .apply_teller_movement(&teller, outcome.event_ids[0], &posting)
            .await?;

        self.event_store.save_snapshot_if_needed(&teller).await?;

        Ok(CashResult {
            transaction_id,
            teller_id: command.teller_id,
            amount: amount.value(),
            till_total: teller.till().total(),
        })
    }
}

/// Handler for counter cash-out
pub struct CashOutHandler {
    event_store: EventStore,
    projection: ProjectionService,
}

impl CashOutHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool),
        }
    }

    /// Execute the cash-out command
    pub async fn execute(
        &self,
        command: CashCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<CashResult, AppError> {
        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;
        let drawer = drawer_from_lines(&command.lines)?;

        let teller: Teller = self
            .event_store
            .load_aggregate(command.teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(command.teller_id.to_string()))?;

        let transaction_id = Uuid::new_v4();
        let event = teller.dispense_cash(
            &amount,
            drawer,
            transaction_id,
            command
                .description
                .unwrap_or_else(|| "Counter cash-out".to_string()),
        )?;

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
            // Loaded state already reflects the original posting
            let transaction_id =
                stored_transaction_id(&self.event_store, outcome.event_ids[0]).await?;
            return Ok(CashResult {
                transaction_id,
                teller_id: command.teller_id,
                amount: amount.value(),
                till_total: teller.till().total(),
            });
        }

        let posting =
            AccountingPosting::cash_out(transaction_id, teller.branch_id(), amount.value())?;

        let teller = teller.apply(event);

        self.projection
            .apply_teller_movement(&teller, outcome.event_ids[0], &posting)
            .await?;

        self.event_store.save_snapshot_if_needed(&teller).await?;

        Ok(CashResult {
            transaction_id,
            teller_id: command.teller_id,
            amount: amount.value(),
            till_total: teller.till().total(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::DrawerLine;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cash_command_with_description() {
        let cmd = CashCommand::new(
            Uuid::new_v4(),
            "120.00".to_string(),
            vec![DrawerLine {
                denomination: dec!(20),
                count: 6,
            }],
        )
        .with_description("Utility bill".to_string());

        assert_eq!(cmd.description, Some("Utility bill".to_string()));
        let drawer = drawer_from_lines(&cmd.lines).unwrap();
        assert_eq!(drawer.total(), dec!(120));
    }
}
