//! Background Maintenance
//!
//! Periodic jobs spawned from main: idempotency-key upkeep, rate-limit
//! bucket cleanup, and monthly partition creation for the append-heavy
//! tables.

use chrono::{Datelike, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::idempotency::{IdempotencyError, IdempotencyRepository};

/// Tables partitioned by month on `created_at`.
const PARTITIONED_TABLES: &[&str] = &["events", "ledger_entries"];

/// Drop rate-limit counter rows whose window has long passed.
/// Windows are one minute wide, so anything older than two is garbage.
pub async fn cleanup_rate_limit_buckets(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM rate_limit_buckets
        WHERE window_start < NOW() - INTERVAL '2 minutes'
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            "Cleaned up expired rate limit buckets"
        );
    }

    Ok(rows_deleted)
}

/// Reset idempotency keys stuck in 'processing' so a crashed posting
/// does not block its key forever.
pub async fn reset_stale_idempotency_keys(pool: &PgPool) -> Result<u64, JobError> {
    let repository = IdempotencyRepository::new(pool.clone());
    let rows_affected = repository.reset_stale().await?;

    if rows_affected > 0 {
        tracing::warn!(
            rows_affected = rows_affected,
            "Reset stale processing idempotency keys"
        );
    }

    Ok(rows_affected)
}

/// Delete idempotency keys past their 24-hour expiry.
pub async fn delete_expired_idempotency_keys(pool: &PgPool) -> Result<u64, JobError> {
    let repository = IdempotencyRepository::new(pool.clone());
    let rows_deleted = repository.cleanup_expired().await?;

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            "Deleted expired idempotency keys"
        );
    }

    Ok(rows_deleted)
}

/// Month window for the month following `(year, month)`.
/// Returns the partition suffix plus the half-open date range.
fn next_month_window(year: i32, month: u32) -> (String, String, String) {
    let next = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let after = if next.1 == 12 {
        (next.0 + 1, 1)
    } else {
        (next.0, next.1 + 1)
    };

    (
        format!("{}_{:02}", next.0, next.1),
        format!("{}-{:02}-01", next.0, next.1),
        format!("{}-{:02}-01", after.0, after.1),
    )
}

/// Create next month's partitions for every partitioned table.
/// Run near the end of each month so inserts never land in the default
/// partition.
pub async fn create_next_month_partitions(pool: &PgPool) -> Result<Vec<String>, JobError> {
    let now = Utc::now();
    let (suffix, start_date, end_date) = next_month_window(now.year(), now.month());

    let mut created = Vec::new();
    for table in PARTITIONED_TABLES {
        let partition = format!("{}_{}", table, suffix);
        if partition_exists(pool, &partition).await? {
            continue;
        }
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} PARTITION OF {}
            FOR VALUES FROM ('{}') TO ('{}')
            "#,
            partition, table, start_date, end_date
        );
        sqlx::query(&sql).execute(pool).await?;
        tracing::info!(partition = %partition, "Created monthly partition");
        created.push(partition);
    }

    Ok(created)
}

async fn partition_exists(pool: &PgPool, table_name: &str) -> Result<bool, JobError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = 'public' AND table_name = $1
        )
        "#,
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Scheduler intervals.
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    pub rate_limit_cleanup_interval: Duration,
    pub idempotency_maintenance_interval: Duration,
    pub partition_check_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            rate_limit_cleanup_interval: Duration::from_secs(60),
            idempotency_maintenance_interval: Duration::from_secs(60),
            partition_check_interval: Duration::from_secs(3600),
        }
    }
}

/// Runs the maintenance jobs on their intervals until aborted.
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Spawn the scheduler loop. Abort the handle to stop it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut rate_limit_tick = interval(self.config.rate_limit_cleanup_interval);
        let mut idempotency_tick = interval(self.config.idempotency_maintenance_interval);
        let mut partition_tick = interval(self.config.partition_check_interval);

        loop {
            tokio::select! {
                _ = rate_limit_tick.tick() => {
                    if let Err(e) = cleanup_rate_limit_buckets(&self.pool).await {
                        tracing::error!(error = %e, "Rate limit cleanup failed");
                    }
                }
                _ = idempotency_tick.tick() => {
                    if let Err(e) = reset_stale_idempotency_keys(&self.pool).await {
                        tracing::error!(error = %e, "Idempotency key reset failed");
                    }
                    if let Err(e) = delete_expired_idempotency_keys(&self.pool).await {
                        tracing::error!(error = %e, "Idempotency key deletion failed");
                    }
                }
                _ = partition_tick.tick() => {
                    if in_partition_creation_window() {
                        if let Err(e) = create_next_month_partitions(&self.pool).await {
                            tracing::error!(error = %e, "Partition creation failed");
                        }
                    }
                }
            }
        }
    }
}

/// Partitions are created in the last 3 days of the month.
fn in_partition_creation_window() -> bool {
    let now = Utc::now();
    now.day() >= days_in_month(now.year(), now.month()) - 3
}

fn days_in_month(year: i32, month: u32) -> u32 {
    if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap()
    .signed_duration_since(chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap())
    .num_days() as u32
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
}
