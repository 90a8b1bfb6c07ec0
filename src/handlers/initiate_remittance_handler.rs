//! Remittance Initiation Handler
//!
//! Cash-in at the source branch: takes principal + charge over the
//! counter, opens the remittance, and hands the sender the pickup code.

use std::str::FromStr;

use rand::Rng;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, InitiateRemittance, Remittance, Teller};
use crate::domain::{Amount, CommissionShares, OperationContext};
use crate::error::AppError;
use crate::event_store::{AggregateOperation, EventStore};
use crate::posting::AccountingPosting;
use crate::projection::ProjectionService;

use super::{drawer_from_lines, InitiateRemittanceCommand, InitiateRemittanceResult};

/// Generate a human-facing remittance reference, e.g. `RMT-20240117-483920`
fn generate_reference() -> String {
    let serial: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!(
        "RMT-{}-{:06}",
        chrono::Utc::now().format("%Y%m%d"),
        serial
    )
}

/// Generate a 6-digit pickup code
fn generate_pickup_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", code)
}

/// Handler for initiating remittances
pub struct InitiateRemittanceHandler {
    event_store: EventStore,
    projection: ProjectionService,
    shares: CommissionShares,
}

impl InitiateRemittanceHandler {
    pub fn new(pool: PgPool, shares: CommissionShares) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool),
            shares,
        }
    }

    /// Execute the initiation command.
    ///
    /// The pickup code is returned in the result and never stored in
    /// clear; only its hash lives in the event stream.
    pub async fn execute(
        &self,
        command: InitiateRemittanceCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<InitiateRemittanceResult, AppError> {
        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;
        let charge = Decimal::from_str(&command.charge)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid charge: {}", e)))?;
        if command.receiver_name.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Receiver name must not be empty".to_string(),
            ));
        }
        let drawer = drawer_from_lines(&command.lines)?;

        let source_branch_id = context
            .branch_id
            .ok_or_else(|| AppError::MissingHeader("X-Branch-Id".to_string()))?;

        let teller: Teller = self
            .event_store
            .load_aggregate(command.source_teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(command.source_teller_id.to_string()))?;

        if teller.branch_id() != source_branch_id {
            return Err(AppError::Forbidden(
                "Teller does not belong to the requesting branch".to_string(),
            ));
        }

        // The till takes principal + charge in one movement
        let total = Amount::new(amount.value() + charge)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid total: {}", e)))?;

        let remittance_id = Uuid::new_v4();
        let reference = generate_reference();
        let pickup_code = generate_pickup_code();

        let (remittance, remittance_event) = Remittance::initiate(InitiateRemittance {
            remittance_id,
            reference: reference.clone(),
            source_branch_id,
            paying_branch_id: command.paying_branch_id,
            source_teller_id: command.source_teller_id,
            sender_name: command.sender_name,
            sender_phone: command.sender_phone,
            receiver_name: command.receiver_name,
            receiver_phone: command.receiver_phone,
            amount: amount.clone(),
            charge,
            pickup_code: pickup_code.clone(),
            shares: self.shares,
        })?;

        let teller_event = teller.deposit_cash(
            &total,
            drawer,
            remittance_id,
            format!("Remittance {} cash-in", reference),
        )?;

        let operations = vec![
            AggregateOperation::new(
                Remittance::aggregate_type(),
                remittance_id,
                0,
                remittance_event.event_type(),
                &remittance_event,
            )?,
            AggregateOperation::new(
                Teller::aggregate_type(),
                command.source_teller_id,
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
            // The pickup code is handed out exactly once; a replayed
            // initiation cannot reproduce it and is refused outright.
            return Err(AppError::IdempotencyConflict);
        }

        let split = self.shares.split(charge)?;
        let posting = AccountingPosting::remittance_initiated(
            remittance_id,
            source_branch_id,
            command.paying_branch_id,
            amount.value(),
            charge,
            &split,
        )?;

        let teller = teller.apply(teller_event);

        self.projection
            .apply_remittance_initiated(&remittance, &teller, outcome.event_ids[0], &posting)
            .await?;

        self.event_store.save_snapshot_if_needed(&teller).await?;

        tracing::info!(
            remittance_id = %remittance_id,
            reference = %reference,
            source_branch_id = %source_branch_id,
            paying_branch_id = %command.paying_branch_id,
            amount = %amount,
            "Remittance initiated"
        );

        Ok(InitiateRemittanceResult {
            remittance_id,
            reference,
            pickup_code,
            amount: amount.value(),
            charge,
            status: remittance.status().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let reference = generate_reference();
        assert!(reference.starts_with("RMT-"));
        assert_eq!(reference.len(), "RMT-20240117-483920".len());
    }

    #[test]
    fn test_pickup_code_is_six_digits() {
        for _ in 0..20 {
            let code = generate_pickup_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
