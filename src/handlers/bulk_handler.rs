//! Bulk Cash Handler
//!
//! Sequential processing of a cash batch against one teller. Each item
//! posts independently; a failed item is recorded in the outcome list
//! and does not abort the rest of the batch.

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Teller};
use crate::domain::{Amount, DomainError, OperationContext, PostingFailureReason};
use crate::error::AppError;
use crate::event_store::{AggregateOperation, EventStore};
use crate::idempotency::IdempotencyRepository;
use crate::posting::AccountingPosting;
use crate::projection::ProjectionService;

use super::{
    drawer_from_lines, BulkCashCommand, BulkCashItem, BulkCashResult, BulkItemOutcome,
    CashDirection,
};

/// Handler for bulk cash batches
pub struct BulkCashHandler {
    event_store: EventStore,
    projection: ProjectionService,
    idempotency: IdempotencyRepository,
}

impl BulkCashHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            projection: ProjectionService::new(pool.clone()),
            idempotency: IdempotencyRepository::new(pool),
        }
    }

    /// Execute the batch. Items are processed in order against the same
    /// teller; the in-memory till is advanced after each posted item so
    /// later items see the cash earlier items moved.
    pub async fn execute(
        &self,
        command: BulkCashCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<BulkCashResult, AppError> {
        if command.items.is_empty() {
            return Err(AppError::InvalidRequest(
                "Batch must contain at least one item".to_string(),
            ));
        }

        // Batch-level replay guard. The key itself is registered with the
        // first posted item's append, so a replayed batch is refused here
        // instead of re-posting the tail items.
        if let Some(key) = idempotency_key {
            if self
                .idempotency
                .get(key)
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?
                .is_some()
            {
                return Err(AppError::IdempotencyConflict);
            }
        }

        let mut teller: Teller = self
            .event_store
            .load_aggregate(command.teller_id)
            .await?
            .ok_or_else(|| AppError::TellerNotFound(command.teller_id.to_string()))?;

        let mut outcomes = Vec::with_capacity(command.items.len());
        let mut posted = 0usize;
        let mut batch_key = idempotency_key;

        for (index, item) in command.items.iter().enumerate() {
            match self
                .post_item(&teller, item, batch_key.take(), context)
                .await
            {
                Ok((updated, transaction_id)) => {
                    teller = updated;
                    posted += 1;
                    outcomes.push(BulkItemOutcome::posted(index, transaction_id));
                }
                Err(err) => {
                    // Key not consumed by a failed item; offer it to the next
                    if batch_key.is_none() && posted == 0 {
                        batch_key = idempotency_key;
                    }
                    let (reason, message) = classify_failure(&err);
                    tracing::warn!(
                        teller_id = %command.teller_id,
                        index,
                        reason = %reason,
                        "Bulk item failed"
                    );
                    outcomes.push(BulkItemOutcome::failed(index, reason, message));
                }
            }
        }

        self.event_store.save_snapshot_if_needed(&teller).await?;

        let failed = outcomes.len() - posted;
        tracing::info!(
            teller_id = %command.teller_id,
            posted,
            failed,
            "Bulk batch processed"
        );

        Ok(BulkCashResult {
            teller_id: command.teller_id,
            posted,
            failed,
            outcomes,
            till_total: teller.till().total(),
        })
    }

    async fn post_item(
        &self,
        teller: &Teller,
        item: &BulkCashItem,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<(Teller, Uuid), AppError> {
        let amount: Amount = item
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;
        let drawer = drawer_from_lines(&item.lines)?;

        let transaction_id = Uuid::new_v4();
        let description = item
            .description
            .clone()
            .unwrap_or_else(|| "Bulk cash posting".to_string());

        let event = match item.direction {
            CashDirection::CashIn => {
                teller.deposit_cash(&amount, drawer, transaction_id, description)?
            }
            CashDirection::CashOut => {
                teller.dispense_cash(&amount, drawer, transaction_id, description)?
            }
        };

        let operation = AggregateOperation::new(
            Teller::aggregate_type(),
            teller.id(),
            teller.version(),
            event.event_type(),
            &event,
        )?;

        let outcome = self
            .event_store
            .append_atomic(vec![operation], idempotency_key, context)
            .await?;

        let posting = match item.direction {
            CashDirection::CashIn => {
                AccountingPosting::cash_in(transaction_id, teller.branch_id(), amount.value())?
            }
            CashDirection::CashOut => {
                AccountingPosting::cash_out(transaction_id, teller.branch_id(), amount.value())?
            }
        };

        let updated = teller.clone().apply(event);

        self.projection
            .apply_teller_movement(&updated, outcome.event_ids[0], &posting)
            .await?;

        Ok((updated, transaction_id))
    }
}

/// Map a posting failure to its batch outcome reason
fn classify_failure(err: &AppError) -> (PostingFailureReason, String) {
    let reason = match err {
        AppError::Domain(domain_err) => match domain_err {
            DomainError::InsufficientTillCash { .. } => PostingFailureReason::InsufficientTillCash,
            DomainError::InsufficientDenomination { .. } => {
                PostingFailureReason::InsufficientDenomination
            }
            DomainError::DrawerAmountMismatch { .. } => PostingFailureReason::DrawerAmountMismatch,
            DomainError::InvalidAmount(_) | DomainError::InvalidDenomination(_) => {
                PostingFailureReason::InvalidAmount
            }
            DomainError::TellerClosed => PostingFailureReason::TellerClosed,
            _ => PostingFailureReason::InternalError,
        },
        AppError::InvalidRequest(_) => PostingFailureReason::InvalidAmount,
        AppError::VersionConflict => PostingFailureReason::ConcurrencyConflict,
        _ => PostingFailureReason::InternalError,
    };
    (reason, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::DrawerLine;
    use rust_decimal_macros::dec;

    fn item(direction: CashDirection, amount: &str, denom: rust_decimal::Decimal, count: u32) -> BulkCashItem {
        BulkCashItem {
            direction,
            amount: amount.to_string(),
            lines: vec![DrawerLine {
                denomination: denom,
                count,
            }],
            description: None,
        }
    }

    #[test]
    fn test_classify_insufficient_denomination() {
        let err = AppError::Domain(DomainError::InsufficientDenomination {
            denomination: dec!(50),
            requested: 3,
            available: 1,
        });
        let (reason, message) = classify_failure(&err);
        assert_eq!(reason, PostingFailureReason::InsufficientDenomination);
        assert!(message.contains("50"));
    }

    #[test]
    fn test_classify_invalid_request() {
        let err = AppError::InvalidRequest("Invalid amount: bad".to_string());
        let (reason, _) = classify_failure(&err);
        assert_eq!(reason, PostingFailureReason::InvalidAmount);
    }

    #[test]
    fn test_bulk_item_outcome_shapes() {
        let posted = BulkItemOutcome::posted(0, Uuid::new_v4());
        assert_eq!(posted.status, "posted");
        assert!(posted.reason.is_none());

        let failed = BulkItemOutcome::failed(
            1,
            PostingFailureReason::TellerClosed,
            "Teller is closed".to_string(),
        );
        assert_eq!(failed.status, "failed");
        assert!(failed.transaction_id.is_none());
    }

    #[test]
    fn test_bulk_items_parse() {
        let items = vec![
            item(CashDirection::CashIn, "100.00", dec!(100), 1),
            item(CashDirection::CashOut, "40.00", dec!(20), 2),
        ];
        for i in &items {
            assert!(drawer_from_lines(&i.lines).is_ok());
        }
    }
}
