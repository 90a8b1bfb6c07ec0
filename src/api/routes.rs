//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::event_store::EventStore;
use crate::handlers::{
    BulkCashCommand, BulkCashHandler, BulkCashItem, BulkItemOutcome, CashCommand, CashInHandler,
    CashOutHandler, CloseTellerHandler, DrawerLine, InitiateRemittanceCommand,
    InitiateRemittanceHandler, OpenTellerCommand, OpenTellerHandler, PayRemittanceCommand,
    PayRemittanceHandler, ProvisionTillCommand, ProvisionTillHandler, RejectRemittanceCommand,
    RejectRemittanceHandler, WithdrawRemittanceCommand, WithdrawRemittanceHandler,
};
use crate::projection::ProjectionService;

use super::middleware::{AuthenticatedApiKey, TellerUser};

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct OpenTellerRequest {
    pub teller_id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct OpenTellerResponse {
    pub teller_id: Uuid,
    pub branch_id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CloseTellerResponse {
    pub teller_id: Uuid,
    pub closing_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub lines: Vec<DrawerLine>,
    pub vault_reference: String,
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub teller_id: Uuid,
    pub moved_total: Decimal,
    pub till_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CashRequest {
    pub teller_id: Uuid,
    pub amount: String,
    pub lines: Vec<DrawerLine>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CashResponse {
    pub transaction_id: Uuid,
    pub teller_id: Uuid,
    pub amount: Decimal,
    pub till_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BulkCashRequest {
    pub teller_id: Uuid,
    pub items: Vec<BulkCashItem>,
}

#[derive(Debug, Serialize)]
pub struct BulkCashResponse {
    pub teller_id: Uuid,
    pub posted: usize,
    pub failed: usize,
    pub outcomes: Vec<BulkItemOutcome>,
    pub till_total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct InitiateRemittanceRequest {
    pub source_teller_id: Uuid,
    pub paying_branch_id: Uuid,
    pub sender_name: String,
    pub sender_phone: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub amount: String,
    pub charge: String,
    pub lines: Vec<DrawerLine>,
}

#[derive(Debug, Serialize)]
pub struct InitiateRemittanceResponse {
    pub remittance_id: Uuid,
    pub reference: String,
    pub pickup_code: String,
    pub amount: Decimal,
    pub charge: Decimal,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PayRemittanceRequest {
    pub pickup_code: String,
    pub paying_teller_id: Uuid,
    pub lines: Vec<DrawerLine>,
}

#[derive(Debug, Serialize)]
pub struct PayRemittanceResponse {
    pub remittance_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRemittanceRequest {
    pub refunding_teller_id: Uuid,
    pub lines: Vec<DrawerLine>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawRemittanceResponse {
    pub remittance_id: Uuid,
    pub reference: String,
    pub refund_total: Decimal,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRemittanceRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RejectRemittanceResponse {
    pub remittance_id: Uuid,
    pub reference: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct RemittanceStatusResponse {
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

#[derive(Debug, Serialize)]
pub struct TillLine {
    pub denomination: Decimal,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TillBalanceResponse {
    pub teller_id: Uuid,
    pub lines: Vec<TillLine>,
    pub total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ProvisioningHistoryEntry {
    pub direction: String,
    pub drawer: serde_json::Value,
    pub total: Decimal,
    pub vault_reference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProvisioningHistoryResponse {
    pub teller_id: Uuid,
    pub entries: Vec<ProvisioningHistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub aggregate_type: Option<String>,
    #[serde(default)]
    pub aggregate_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EventsListResponse {
    pub events: Vec<EventResponse>,
    pub total: i64,
}

/// Shared router state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

/// Extract the Idempotency-Key header if present
fn idempotency_key(headers: &axum::http::HeaderMap) -> Option<Uuid> {
    headers
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Teller lifecycle
        .route("/tellers", post(open_teller))
        .route("/tellers/:teller_id/close", post(close_teller))
        // Vault movements
        .route("/tellers/:teller_id/provision", post(provision_till))
        .route("/tellers/:teller_id/return", post(return_till))
        // Till queries
        .route("/tellers/:teller_id/balance", get(get_till_balance))
        .route(
            "/tellers/:teller_id/provisioning-history",
            get(get_provisioning_history),
        )
        // Counter transactions
        .route("/transactions/cash-in", post(cash_in))
        .route("/transactions/cash-out", post(cash_out))
        .route("/transactions/bulk", post(bulk_cash))
        // Remittances
        .route("/remittances", post(initiate_remittance))
        .route("/remittances/:reference", get(get_remittance))
        .route("/remittances/:reference/pay", post(pay_remittance))
        .route("/remittances/:reference/withdraw", post(withdraw_remittance))
        .route("/remittances/:reference/reject", post(reject_remittance))
        // Admin
        .route("/admin/events", get(get_events))
}

// =========================================================================
// Teller lifecycle
// =========================================================================

/// Open a teller position
async fn open_teller(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    teller_user: Option<Extension<TellerUser>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<OpenTellerRequest>,
) -> Result<(StatusCode, Json<OpenTellerResponse>), AppError> {
    // The operator behind the counter must identify itself
    let teller_user =
        teller_user.ok_or_else(|| AppError::MissingHeader("X-Teller-User-Id".to_string()))?;

    let handler = OpenTellerHandler::new(state.pool);

    let command = OpenTellerCommand::new(
        request.teller_id,
        request.branch_id,
        teller_user.user_id,
        request.name,
    );

    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OpenTellerResponse {
            teller_id: result.teller_id,
            branch_id: result.branch_id,
            name: result.name,
        }),
    ))
}

/// Close a teller position
async fn close_teller(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(teller_id): Path<Uuid>,
    headers: axum::http::HeaderMap,
) -> Result<Json<CloseTellerResponse>, AppError> {
    let handler = CloseTellerHandler::new(state.pool);

    let result = handler
        .execute(teller_id, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(CloseTellerResponse {
        teller_id: result.teller_id,
        closing_total: result.closing_total,
    }))
}

// =========================================================================
// Vault movements
// =========================================================================

/// Provision the till from the vault
async fn provision_till(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(teller_id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(request): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>, AppError> {
    let handler = ProvisionTillHandler::new(state.pool);

    let command = ProvisionTillCommand::new(teller_id, request.lines, request.vault_reference);

    let result = handler
        .provision(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(ProvisionResponse {
        teller_id: result.teller_id,
        moved_total: result.moved_total,
        till_total: result.till_total,
    }))
}

/// Return cash from the till to the vault
async fn return_till(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(teller_id): Path<Uuid>,
    headers: axum::http::HeaderMap,
    Json(request): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>, AppError> {
    let handler = ProvisionTillHandler::new(state.pool);

    let command = ProvisionTillCommand::new(teller_id, request.lines, request.vault_reference);

    let result = handler
        .return_to_vault(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(ProvisionResponse {
        teller_id: result.teller_id,
        moved_total: result.moved_total,
        till_total: result.till_total,
    }))
}

// =========================================================================
// Till queries
// =========================================================================

/// Get the per-denomination till balance
async fn get_till_balance(
    State(state): State<AppState>,
    Path(teller_id): Path<Uuid>,
) -> Result<Json<TillBalanceResponse>, AppError> {
    let projection = ProjectionService::new(state.pool.clone());

    let lines = projection.get_till_lines(teller_id).await?;
    if lines.is_empty() {
        // A freshly opened or fully returned till has no lines; only an
        // unknown teller is a 404.
        let store = EventStore::new(state.pool);
        if !store.aggregate_exists(teller_id).await? {
            return Err(AppError::TellerNotFound(teller_id.to_string()));
        }
    }

    let total = lines
        .iter()
        .map(|(denomination, count)| *denomination * Decimal::from(*count))
        .sum();

    Ok(Json(TillBalanceResponse {
        teller_id,
        lines: lines
            .into_iter()
            .map(|(denomination, count)| TillLine {
                denomination,
                count,
            })
            .collect(),
        total,
    }))
}

/// Get the till provisioning history
async fn get_provisioning_history(
    State(state): State<AppState>,
    Path(teller_id): Path<Uuid>,
) -> Result<Json<ProvisioningHistoryResponse>, AppError> {
    let projection = ProjectionService::new(state.pool);

    let records = projection.get_provisioning_history(teller_id).await?;

    Ok(Json(ProvisioningHistoryResponse {
        teller_id,
        entries: records
            .into_iter()
            .map(|r| ProvisioningHistoryEntry {
                direction: r.direction,
                drawer: r.drawer,
                total: r.total,
                vault_reference: r.vault_reference,
                created_at: r.created_at,
            })
            .collect(),
    }))
}

// =========================================================================
// Counter transactions
// =========================================================================

/// Post a counter cash-in
async fn cash_in(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: axum::http::HeaderMap,
    Json(request): Json<CashRequest>,
) -> Result<Json<CashResponse>, AppError> {
    let handler = CashInHandler::new(state.pool);

    let command = build_cash_command(request);
    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(CashResponse {
        transaction_id: result.transaction_id,
        teller_id: result.teller_id,
        amount: result.amount,
        till_total: result.till_total,
    }))
}

/// Post a counter cash-out
async fn cash_out(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: axum::http::HeaderMap,
    Json(request): Json<CashRequest>,
) -> Result<Json<CashResponse>, AppError> {
    let handler = CashOutHandler::new(state.pool);

    let command = build_cash_command(request);
    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(CashResponse {
        transaction_id: result.transaction_id,
        teller_id: result.teller_id,
        amount: result.amount,
        till_total: result.till_total,
    }))
}

fn build_cash_command(request: CashRequest) -> CashCommand {
    let command = CashCommand::new(request.teller_id, request.amount, request.lines);
    if let Some(description) = request.description {
        command.with_description(description)
    } else {
        command
    }
}

/// Post a bulk cash batch
async fn bulk_cash(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: axum::http::HeaderMap,
    Json(request): Json<BulkCashRequest>,
) -> Result<Json<BulkCashResponse>, AppError> {
    let handler = BulkCashHandler::new(state.pool);

    let command = BulkCashCommand {
        teller_id: request.teller_id,
        items: request.items,
    };

    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(BulkCashResponse {
        teller_id: result.teller_id,
        posted: result.posted,
        failed: result.failed,
        outcomes: result.outcomes,
        till_total: result.till_total,
    }))
}

// =========================================================================
// Remittances
// =========================================================================

/// Initiate a remittance
async fn initiate_remittance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: axum::http::HeaderMap,
    Json(request): Json<InitiateRemittanceRequest>,
) -> Result<(StatusCode, Json<InitiateRemittanceResponse>), AppError> {
    let handler = InitiateRemittanceHandler::new(state.pool, state.config.commission_shares()?);

    let command = InitiateRemittanceCommand {
        source_teller_id: request.source_teller_id,
        paying_branch_id: request.paying_branch_id,
        sender_name: request.sender_name,
        sender_phone: request.sender_phone,
        receiver_name: request.receiver_name,
        receiver_phone: request.receiver_phone,
        amount: request.amount,
        charge: request.charge,
        lines: request.lines,
    };

    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitiateRemittanceResponse {
            remittance_id: result.remittance_id,
            reference: result.reference,
            pickup_code: result.pickup_code,
            amount: result.amount,
            charge: result.charge,
            status: result.status,
        }),
    ))
}

/// Get a remittance by reference
async fn get_remittance(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<RemittanceStatusResponse>, AppError> {
    let projection = ProjectionService::new(state.pool);

    let record = projection
        .get_remittance_by_reference(&reference)
        .await?
        .ok_or_else(|| AppError::RemittanceNotFound(reference))?;

    Ok(Json(RemittanceStatusResponse {
        reference: record.reference,
        source_branch_id: record.source_branch_id,
        paying_branch_id: record.paying_branch_id,
        sender_name: record.sender_name,
        receiver_name: record.receiver_name,
        amount: record.amount,
        charge: record.charge,
        status: record.status,
        initiated_at: record.initiated_at,
        settled_at: record.settled_at,
    }))
}

/// Pay out a remittance
async fn pay_remittance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(reference): Path<String>,
    headers: axum::http::HeaderMap,
    Json(request): Json<PayRemittanceRequest>,
) -> Result<Json<PayRemittanceResponse>, AppError> {
    let handler = PayRemittanceHandler::new(state.pool);

    let command = PayRemittanceCommand {
        reference,
        pickup_code: request.pickup_code,
        paying_teller_id: request.paying_teller_id,
        lines: request.lines,
    };

    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(PayRemittanceResponse {
        remittance_id: result.remittance_id,
        reference: result.reference,
        amount: result.amount,
        status: result.status,
    }))
}

/// Withdraw a remittance (sender cancellation)
async fn withdraw_remittance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(reference): Path<String>,
    headers: axum::http::HeaderMap,
    Json(request): Json<WithdrawRemittanceRequest>,
) -> Result<Json<WithdrawRemittanceResponse>, AppError> {
    let handler = WithdrawRemittanceHandler::new(state.pool);

    let command = WithdrawRemittanceCommand {
        reference,
        refunding_teller_id: request.refunding_teller_id,
        lines: request.lines,
    };

    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(WithdrawRemittanceResponse {
        remittance_id: result.remittance_id,
        reference: result.reference,
        refund_total: result.refund_total,
        status: result.status,
    }))
}

/// Reject a remittance (back office)
async fn reject_remittance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Path(reference): Path<String>,
    headers: axum::http::HeaderMap,
    Json(request): Json<RejectRemittanceRequest>,
) -> Result<Json<RejectRemittanceResponse>, AppError> {
    // Rejection is a back-office action
    if !api_key.has_permission("manage_remittances") {
        return Err(AppError::Forbidden(
            "manage_remittances permission required".to_string(),
        ));
    }

    let handler = RejectRemittanceHandler::new(state.pool);

    let command = RejectRemittanceCommand {
        reference,
        reason: request.reason,
    };

    let result = handler
        .execute(command, idempotency_key(&headers), &context)
        .await?;

    Ok(Json(RejectRemittanceResponse {
        remittance_id: result.remittance_id,
        reference: result.reference,
        status: result.status,
    }))
}

// =========================================================================
// Admin
// =========================================================================

/// Get events (admin only)
async fn get_events(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsListResponse>, AppError> {
    // Check admin permission
    if !api_key.has_permission("admin") {
        return Err(AppError::Forbidden("admin permission required".to_string()));
    }

    let pool = state.pool;
    let limit = query.limit.min(1000);
    let offset = query.offset;

    // Build query based on filters
    let events: Vec<(Uuid, String, Uuid, String, i64, DateTime<Utc>)> = if let Some(ref agg_type) = query.aggregate_type {
        if let Some(agg_id) = query.aggregate_id {
            sqlx::query_as(
                r#"
                SELECT id, aggregate_type, aggregate_id, event_type, version, created_at
                FROM events
                WHERE aggregate_type = $1 AND aggregate_id = $2
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(agg_type)
            .bind(agg_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await?
        } else {
            sqlx::query_as(
                r#"
                SELECT id, aggregate_type, aggregate_id, event_type, version, created_at
                FROM events
                WHERE aggregate_type = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(agg_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await?
        }
    } else {
        sqlx::query_as(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, version, created_at
            FROM events
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&pool)
        .await?
    };

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(&pool)
        .await?;

    let events: Vec<EventResponse> = events
        .into_iter()
        .map(|(id, aggregate_type, aggregate_id, event_type, version, created_at)| {
            EventResponse {
                id,
                aggregate_type,
                aggregate_id,
                event_type,
                version,
                created_at,
            }
        })
        .collect();

    Ok(Json(EventsListResponse { events, total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_teller_request_deserialize() {
        let json = r#"{
            "teller_id": "550e8400-e29b-41d4-a716-446655440000",
            "branch_id": "550e8400-e29b-41d4-a716-446655440001",
            "name": "Counter 1"
        }"#;

        let request: OpenTellerRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.name, "Counter 1");
    }

    #[test]
    fn test_cash_request_deserialize() {
        let json = r#"{
            "teller_id": "550e8400-e29b-41d4-a716-446655440000",
            "amount": "350.00",
            "lines": [
                { "denomination": "100", "count": 3 },
                { "denomination": "50", "count": 1 }
            ]
        }"#;

        let request: CashRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount, "350.00");
        assert_eq!(request.lines.len(), 2);
        assert!(request.description.is_none());
    }

    #[test]
    fn test_events_query_defaults() {
        let query: EventsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
        assert!(query.aggregate_type.is_none());
    }

    #[test]
    fn test_idempotency_key_extraction() {
        let mut headers = axum::http::HeaderMap::new();
        assert!(idempotency_key(&headers).is_none());

        headers.insert(
            "Idempotency-Key",
            "550e8400-e29b-41d4-a716-446655440009".parse().unwrap(),
        );
        assert!(idempotency_key(&headers).is_some());

        headers.insert("Idempotency-Key", "not-a-uuid".parse().unwrap());
        assert!(idempotency_key(&headers).is_none());
    }
}
