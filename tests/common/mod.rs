//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// API key used by integration tests
pub const TEST_API_KEY: &str = "test_key_123";

/// Setup test database - truncate tables and seed test data
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    // Compute hash dynamically to match what middleware expects
    let hash_check: String =
        sqlx::query_scalar("SELECT encode(sha256($1::bytea), 'hex')")
            .bind(TEST_API_KEY.as_bytes())
            .fetch_one(&pool)
            .await
            .unwrap();

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    // Clean up DB for fresh state
    sqlx::query(
        "TRUNCATE TABLE events, event_snapshots, api_keys, idempotency_keys, \
         teller_balances, till_provisioning_history, remittances, ledger_entries CASCADE",
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to clean up DB");

    // Seed test API Key with dynamically computed hash
    sqlx::query(
        r#"
        INSERT INTO api_keys (id, name, key_hash, key_prefix, permissions, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (key_prefix) DO NOTHING
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind("Test Key")
    .bind(&hash_check)
    .bind("test_")
    .bind(vec![
        "admin".to_string(),
        "post_cash".to_string(),
        "manage_remittances".to_string(),
    ])
    .bind(true)
    .execute(&mut *tx)
    .await
    .expect("Failed to seed API key");

    tx.commit().await.expect("Failed to commit transaction");

    pool
}
