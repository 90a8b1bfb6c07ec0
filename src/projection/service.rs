//! Projection Service
//!
//! Updates read-model tables from events: per-denomination teller balances,
//! the till provisioning history, the remittance index and the ledger
//! entries produced by accounting postings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::aggregate::{Aggregate, Remittance, Teller};
use crate::domain::{CashDrawer, RemittanceStatus};
use crate::posting::AccountingPosting;

/// Projection Service for updating read models
#[derive(Debug, Clone)]
pub struct ProjectionService {
    pool: PgPool,
}

/// Remittance index row (query surface for status lookup)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RemittanceRecord {
    pub id: Uuid,
    pub reference: String,
    pub source_branch_id: Uuid,
    pub paying_branch_id: Uuid,
    pub sender_name: String,
    pub receiver_name: String,
    pub amount: Decimal,
    pub charge: Decimal,
    pub status: String,
    pub initiated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Till provisioning history row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProvisioningRecord {
    pub id: Uuid,
    pub teller_id: Uuid,
    pub branch_id: Uuid,
    pub direction: String,
    pub drawer: serde_json::Value,
    pub total: Decimal,
    pub vault_reference: String,
    pub operator_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ProjectionService {
    /// Create a new ProjectionService
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Teller read model
    // =========================================================================

    /// Apply a cash movement: refresh the per-denomination till lines and
    /// write the posting's ledger entries, in one transaction.
    pub async fn apply_teller_movement(
        &self,
        teller: &Teller,
        event_id: Uuid,
        posting: &AccountingPosting,
    ) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await?;

        self.replace_till_lines(&mut tx, teller, event_id).await?;
        self.insert_ledger_entries(&mut tx, posting, event_id).await?;

        tx.commit().await?;

        tracing::debug!(
            teller_id = %teller.id(),
            journal_id = %posting.journal_id,
            total = %teller.till().total(),
            "Teller projection updated"
        );

        Ok(())
    }

    /// Record a provisioning or return movement in the history, alongside
    /// the till refresh and the vault posting.
    pub async fn apply_provisioning(
        &self,
        teller: &Teller,
        drawer: &CashDrawer,
        direction: &str,
        vault_reference: &str,
        event_id: Uuid,
        posting: &AccountingPosting,
    ) -> Result<(), ProjectionError> {
        let drawer_json = serde_json::to_value(drawer)
            .map_err(|e| ProjectionError::Serialization(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        self.replace_till_lines(&mut tx, teller, event_id).await?;
        self.insert_ledger_entries(&mut tx, posting, event_id).await?;

        sqlx::query(
            r#"
            INSERT INTO till_provisioning_history
                (teller_id, branch_id, direction, drawer, total, vault_reference, operator_user_id, event_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(teller.id())
        .bind(teller.branch_id())
        .bind(direction)
        .bind(drawer_json)
        .bind(drawer.total())
        .bind(vault_reference)
        .bind(teller.operator_user_id())
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Replace the teller's per-denomination balance lines with the current
    /// till state. Absolute counts, not deltas: replay-safe.
    async fn replace_till_lines(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        teller: &Teller,
        event_id: Uuid,
    ) -> Result<(), ProjectionError> {
        sqlx::query("DELETE FROM teller_balances WHERE teller_id = $1")
            .bind(teller.id())
            .execute(&mut **tx)
            .await?;

        for (denomination, count) in teller.till().lines() {
            sqlx::query(
                r#"
                INSERT INTO teller_balances
                    (teller_id, branch_id, denomination, note_count, last_event_id, last_event_version)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(teller.id())
            .bind(teller.branch_id())
            .bind(denomination.face_value())
            .bind(count as i64)
            .bind(event_id)
            .bind(teller.version())
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Per-denomination till lines for one teller
    pub async fn get_till_lines(
        &self,
        teller_id: Uuid,
    ) -> Result<Vec<(Decimal, i64)>, ProjectionError> {
        let lines: Vec<(Decimal, i64)> = sqlx::query_as(
            r#"
            SELECT denomination, note_count
            FROM teller_balances
            WHERE teller_id = $1
            ORDER BY denomination DESC
            "#,
        )
        .bind(teller_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Provisioning history for one teller, newest first
    pub async fn get_provisioning_history(
        &self,
        teller_id: Uuid,
    ) -> Result<Vec<ProvisioningRecord>, ProjectionError> {
        let records: Vec<ProvisioningRecord> = sqlx::query_as(
            r#"
            SELECT id, teller_id, branch_id, direction, drawer, total, vault_reference, operator_user_id, created_at
            FROM till_provisioning_history
            WHERE teller_id = $1
            ORDER BY created_at DESC
            LIMIT 200
            "#,
        )
        .bind(teller_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    // =========================================================================
    // Remittance read model
    // =========================================================================

    /// Index a newly initiated remittance and write its posting.
    pub async fn apply_remittance_initiated(
        &self,
        remittance: &Remittance,
        teller: &Teller,
        event_id: Uuid,
        posting: &AccountingPosting,
    ) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO remittances
                (id, reference, source_branch_id, paying_branch_id, sender_name, sender_phone,
                 receiver_name, receiver_phone, amount, charge, status, initiated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            "#,
        )
        .bind(remittance.id())
        .bind(remittance.reference())
        .bind(remittance.source_branch_id())
        .bind(remittance.paying_branch_id())
        .bind(remittance.sender_name())
        .bind(remittance.sender_phone())
        .bind(remittance.receiver_name())
        .bind(remittance.receiver_phone())
        .bind(remittance.amount())
        .bind(remittance.charge())
        .bind(RemittanceStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        self.replace_till_lines(&mut tx, teller, event_id).await?;
        self.insert_ledger_entries(&mut tx, posting, event_id).await?;

        tx.commit().await?;

        Ok(())
    }

    /// Move a remittance to a terminal status, updating the paying-side
    /// till when cash moved, and write the settlement posting.
    pub async fn apply_remittance_settled(
        &self,
        remittance_id: Uuid,
        status: RemittanceStatus,
        teller: Option<&Teller>,
        event_id: Uuid,
        posting: &AccountingPosting,
    ) -> Result<(), ProjectionError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE remittances
            SET status = $2, settled_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(remittance_id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;

        if let Some(teller) = teller {
            self.replace_till_lines(&mut tx, teller, event_id).await?;
        }
        self.insert_ledger_entries(&mut tx, posting, event_id).await?;

        tx.commit().await?;

        Ok(())
    }

    /// Mark a remittance rejected (no cash movement, no posting).
    pub async fn apply_remittance_rejected(
        &self,
        remittance_id: Uuid,
    ) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            UPDATE remittances
            SET status = $2, settled_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(remittance_id)
        .bind(RemittanceStatus::Rejected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a remittance by its human-facing reference
    pub async fn get_remittance_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<RemittanceRecord>, ProjectionError> {
        let record: Option<RemittanceRecord> = sqlx::query_as(
            r#"
            SELECT id, reference, source_branch_id, paying_branch_id, sender_name, receiver_name,
                   amount, charge, status, initiated_at, settled_at
            FROM remittances
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    // =========================================================================
    // Ledger entries
    // =========================================================================

    /// Write the journal lines of a balanced posting.
    async fn insert_ledger_entries(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        posting: &AccountingPosting,
        event_id: Uuid,
    ) -> Result<(), ProjectionError> {
        debug_assert!(posting.is_balanced());

        for line in &posting.lines {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (journal_id, event_id, account_code, amount, entry_type, description)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(posting.journal_id)
            .bind(event_id)
            .bind(line.account.code())
            .bind(line.amount)
            .bind(line.side.as_str())
            .bind(&posting.description)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

/// Projection errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Teller not found: {0}")]
    TellerNotFound(Uuid),

    #[error("Remittance not found: {0}")]
    RemittanceNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
