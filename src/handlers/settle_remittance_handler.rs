//! Remittance Withdrawal and Rejection Handlers
//!
//! Sender-side cancellation (refund at the source branch) and
//! back-office rejection of pending remittances.

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Remittance, Teller};
use crate::domain::{Amount, OperationContext};
use crate::error::AppError;
use crate::event_store::{AggregateOperation, EventStore};
use crate::posting::AccountingPosting;
use crate::projection::ProjectionService;

use super::{
    drawer_from_lines, RejectRemittanceCommand, RejectRemittanceResult,
    WithdrawRemittanceCommand, WithdrawRemittanceResult,
};

/// Handler for sender withdrawals
pub struct WithdrawRemittanceHandler {
    event_store: EventStore,
    projection: ProjectionService,
}

impl WithdrawRemittanceHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool),
        }
    }

    /// Execute the withdrawal. Principal and the full charge are refunded
    /// in cash at the source branch.
    pub async fn execute(
        &self,
        command: WithdrawRemittanceCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<WithdrawRemittanceResult, AppError> {
        let drawer = drawer_from_lines(&command.lines)?;

        let requesting_branch_id = context
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
            .load_aggregate(command.refunding_teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(command.refunding_teller_id.to_string()))?;

        if teller.branch_id() != requesting_branch_id {
            return Err(AppError::Forbidden(
                "Teller does not belong to the requesting branch".to_string(),
            ));
        }

        let remittance_event = remittance.withdraw(requesting_branch_id)?;

        let refund_total = Amount::new(remittance.amount() + remittance.charge())
            .map_err(|e| AppError::Internal(format!("Stored refund total invalid: {}", e)))?;
        let teller_event = teller.dispense_cash(
            &refund_total,
            drawer,
            remittance.id(),
            format!("Remittance {} refund", command.reference),
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
                command.refunding_teller_id,
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
            let remittance = remittance.apply(remittance_event);
            return Ok(WithdrawRemittanceResult {
                remittance_id: remittance.id(),
                reference: command.reference,
                refund_total: refund_total.value(),
                status: remittance.status().to_string(),
            });
        }

        let split = remittance.shares().split(remittance.charge())?;
        let posting = AccountingPosting::remittance_withdrawn(
            remittance.id(),
            remittance.source_branch_id(),
            remittance.paying_branch_id(),
            remittance.amount(),
            remittance.charge(),
            &split,
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

        tracing::info!(
            remittance_id = %remittance.id(),
            reference = %command.reference,
            refund_total = %refund_total,
            "Remittance withdrawn"
        );

        Ok(WithdrawRemittanceResult {
            remittance_id: remittance.id(),
            reference: command.reference,
            refund_total: refund_total.value(),
            status: remittance.status().to_string(),
        })
    }
}

/// Handler for back-office rejections
pub struct RejectRemittanceHandler {
    event_store: EventStore,
    projection: ProjectionService,
}

impl RejectRemittanceHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool),
        }
    }

    /// Execute the rejection. No cash moves; the remittance is closed.
    pub async fn execute(
        &self,
        command: RejectRemittanceCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<RejectRemittanceResult, AppError> {
        if command.reason.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Rejection reason must not be empty".to_string(),
            ));
        }

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

        let event = remittance.reject(command.reason.clone())?;

        let operation = AggregateOperation::new(
            Remittance::aggregate_type(),
            remittance.id(),
            remittance.version(),
            event.event_type(),
            &event,
        )?;

        self.event_store
            .append_atomic(vec![operation], idempotency_key, context)
            .await?;

        let remittance = remittance.apply(event);

        self.projection
            .apply_remittance_rejected(remittance.id())
            .await?;

        tracing::info!(
            remittance_id = %remittance.id(),
            reference = %command.reference,
            reason = %command.reason,
            "Remittance rejected"
        );

        Ok(RejectRemittanceResult {
            remittance_id: remittance.id(),
            reference: command.reference,
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
    fn test_withdraw_command_drawer() {
        let cmd = WithdrawRemittanceCommand {
            reference: "RMT-20240117-000002".to_string(),
            refunding_teller_id: Uuid::new_v4(),
            lines: vec![
                DrawerLine {
                    denomination: dec!(100),
                    count: 5,
                },
                DrawerLine {
                    denomination: dec!(5),
                    count: 1,
                },
            ],
        };

        let drawer = drawer_from_lines(&cmd.lines).unwrap();
        assert_eq!(drawer.total(), dec!(505));
    }

    #[test]
    fn test_reject_command_requires_reason() {
        let cmd = RejectRemittanceCommand {
            reference: "RMT-20240117-000003".to_string(),
            reason: "  ".to_string(),
        };
        assert!(cmd.reason.trim().is_empty());
    }
}
