//! Idempotency Repository
//!
//! Key registration happens inside the event store transaction; this
//! repository covers lookup and the maintenance paths (stale-key reset,
//! expiry cleanup) used by background jobs and replay checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Idempotency key status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<String> for IdempotencyStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => IdempotencyStatus::Pending,
            "processing" => IdempotencyStatus::Processing,
            "completed" => IdempotencyStatus::Completed,
            "failed" => IdempotencyStatus::Failed,
            _ => IdempotencyStatus::Pending,
        }
    }
}

impl std::fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdempotencyStatus::Pending => write!(f, "pending"),
            IdempotencyStatus::Processing => write!(f, "processing"),
            IdempotencyStatus::Completed => write!(f, "completed"),
            IdempotencyStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Stored idempotency key information
#[derive(Debug, Clone)]
pub struct IdempotencyKey {
    pub key: Uuid,
    pub event_id: Option<Uuid>,
    pub status: IdempotencyStatus,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Idempotency Repository Error
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for managing idempotency keys
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    pool: PgPool,
}

impl IdempotencyRepository {
    /// Create a new IdempotencyRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get an existing idempotency key
    pub async fn get(&self, key: Uuid) -> Result<Option<IdempotencyKey>, IdempotencyError> {
        let result: Option<(
            Uuid,
            Option<Uuid>,
            String,
            Option<DateTime<Utc>>,
            DateTime<Utc>,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT key, event_id, processing_status, processing_started_at, created_at, expires_at
            FROM idempotency_keys
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result.map(
            |(key, event_id, status, processing_started_at, created_at, expires_at)| {
                IdempotencyKey {
                    key,
                    event_id,
                    status: IdempotencyStatus::from(status),
                    processing_started_at,
                    created_at,
                    expires_at,
                }
            },
        ))
    }

    /// Reset keys stuck in 'processing' for longer than 5 minutes.
    /// A crashed request would otherwise block its key forever.
    pub async fn reset_stale(&self) -> Result<u64, IdempotencyError> {
        let rows = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET processing_status = 'failed'
            WHERE processing_status = 'processing'
              AND processing_started_at < NOW() - INTERVAL '5 minutes'
            "#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows)
    }

    /// Delete expired idempotency keys
    pub async fn cleanup_expired(&self) -> Result<u64, IdempotencyError> {
        let rows = sqlx::query(
            r#"
            DELETE FROM idempotency_keys
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_status_from_string() {
        assert_eq!(
            IdempotencyStatus::from("processing".to_string()),
            IdempotencyStatus::Processing
        );
        assert_eq!(
            IdempotencyStatus::from("completed".to_string()),
            IdempotencyStatus::Completed
        );
        assert_eq!(
            IdempotencyStatus::from("failed".to_string()),
            IdempotencyStatus::Failed
        );
        // Unknown values degrade to pending
        assert_eq!(
            IdempotencyStatus::from("unknown".to_string()),
            IdempotencyStatus::Pending
        );
    }

    #[test]
    fn test_idempotency_status_display() {
        assert_eq!(IdempotencyStatus::Pending.to_string(), "pending");
        assert_eq!(IdempotencyStatus::Processing.to_string(), "processing");
        assert_eq!(IdempotencyStatus::Completed.to_string(), "completed");
        assert_eq!(IdempotencyStatus::Failed.to_string(), "failed");
    }
}
