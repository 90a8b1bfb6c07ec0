//! Remittance Payout Handler
//!
//! Cash-out at the paying branch. The receiver presents the reference
//! and pickup code; the remittance settles at most once.

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Remittance, Teller};
use crate::domain::{Amount, OperationContext, RemittanceEvent, RemittanceStatus};
use crate::error::AppError;
use crate::event_store::{AggregateOperation, EventStore};
use crate::idempotency::{IdempotencyRepository, IdempotencyStatus};
use crate::posting::AccountingPosting;
use crate::projection::ProjectionService;

use super::{drawer_from_lines, PayRemittanceCommand, PayRemittanceResult};

/// Handler for remittance payouts
pub struct PayRemittanceHandler {
    event_store: EventStore,
    projection: ProjectionService,
    idempotency: IdempotencyRepository,
}

impl PayRemittanceHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool.clone()),
            idempotency: IdempotencyRepository::new(pool),
        }
    }

    /// Execute the payout command
    pub async fn execute(
        &self,
        command: PayRemittanceCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<PayRemittanceResult, AppError> {
        let drawer = drawer_from_lines(&command.lines)?;

        let paying_branch_id = context
            .branch_id
            .ok_or_else(|| AppError::MissingHeader("X-Branch-Id".to_string()))?;

        let record = self
            .projection
            .get_remittance_by_reference(&command.reference)
            .await?
            .ok_or_else(|| AppError::RemittanceNotFound(command.reference.clone()))?;

        let remittance: Remittance = self
            .event_store
            .load_aggregate(record.id)
            .await?
            .ok_or_else(|| AppError::RemittanceNotFound(command.reference.clone()))?;

        let teller: Teller = self
            .event_store
            .load_aggregate(command.paying_teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(command.paying_teller_id.to_string()))?;

        if teller.branch_id() != paying_branch_id {
            return Err(AppError::Forbidden(
                "Teller does not belong to the requesting branch".to_string(),
            ));
        }

        // A replayed payout must short-circuit to the stored outcome
        // before the at-most-once guard treats it as a second collection
        if let Some(key) = idempotency_key {
            if let Some(stored) = self
                .idempotency
                .get(key)
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?
            {
                if stored.status == IdempotencyStatus::Completed
                    && remittance.status() == RemittanceStatus::Paid
                {
                    let commission = remittance.shares().split(remittance.charge())?;
                    return Ok(PayRemittanceResult {
                        remittance_id: remittance.id(),
                        reference: command.reference,
                        amount: remittance.amount(),
                        commission,
                        status: remittance.status().to_string(),
                    });
                }
                return Err(AppError::IdempotencyConflict);
            }
        }

        let remittance_event = remittance.pay(
            &command.pickup_code,
            paying_branch_id,
            command.paying_teller_id,
        )?;

        let commission = match &remittance_event {
            RemittanceEvent::RemittancePaid { commission, .. } => *commission,
            _ => return Err(AppError::Internal("Unexpected payout event".to_string())),
        };

        // The till dispenses the principal only
        let amount = Amount::new(remittance.amount())
            .map_err(|e| AppError::Internal(format!("Stored amount invalid: {}", e)))?;
        let teller_event = teller.dispense_cash(
            &amount,
            drawer,
            remittance.id(),
            format!("Remittance {} payout", command.reference),
        )?;

        let operations = vec![
            AggregateOperation::new(
                Remittance::aggregate_type(),
                remittance.id(),
                remittance.version(),
                remittance_event.event_type(),
                &remittance_event,
            )?,
            AggregateOperation::new(
                Teller::aggregate_type(),
                command.paying_teller_id,
                teller.version(),
                teller_event.event_type(),
                &teller_event,
            )?,
        ];

        let outcome = self
            .event_store
            .append_atomic(operations, idempotency_key, context)
            .await?;

        if outcome.replayed {
            // Lost a race with the same key; the stored payout matches this one
            let remittance = remittance.apply(remittance_event);
            return Ok(PayRemittanceResult {
                remittance_id: remittance.id(),
                reference: command.reference,
                amount: remittance.amount(),
                commission,
                status: remittance.status().to_string(),
            });
        }

        let posting = AccountingPosting::remittance_paid(
            remittance.id(),
            paying_branch_id,
            remittance.amount(),
            &commission,
        )?;

        let remittance = remittance.apply(remittance_event);
        let teller = teller.apply(teller_event);

        self.projection
            .apply_remittance_settled(
                remittance.id(),
                remittance.status(),
                Some(&teller),
                outcome.event_ids[0],
                &posting,
            )
            .await?;

        self.event_store.save_snapshot_if_needed(&teller).await?;
        self.event_store
            .save_snapshot_if_needed(&remittance)
            .await?;

        tracing::info!(
            remittance_id = %remittance.id(),
            reference = %command.reference,
            paying_branch_id = %paying_branch_id,
            amount = %remittance.amount(),
            "Remittance paid"
        );

        Ok(PayRemittanceResult {
            remittance_id: remittance.id(),
            reference: command.reference,
            amount: remittance.amount(),
            commission,
            status: remittance.status().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::DrawerLine;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pay_command_drawer() {
        let cmd = PayRemittanceCommand {
            reference: "RMT-20240117-000001".to_string(),
            pickup_code: "123456".to_string(),
            paying_teller_id: Uuid::new_v4(),
            lines: vec![DrawerLine {
                denomination: dec!(100),
                count: 5,
            }],
        };

        let drawer = drawer_from_lines(&cmd.lines).unwrap();
        assert_eq!(drawer.total(), dec!(500));
    }
}
