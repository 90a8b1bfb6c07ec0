//! API Middleware
//!
//! Authentication, rate limiting, and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::OperationContext;

/// API Key authentication result
#[derive(Debug, Clone)]
pub struct AuthenticatedApiKey {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<String>,
}

impl AuthenticatedApiKey {
    /// Check if this API key has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == permission || p == "admin")
    }
}

/// Operating teller user from X-Teller-User-Id header
#[derive(Debug, Clone)]
pub struct TellerUser {
    pub user_id: Uuid,
}

/// JSON error response in the same shape the handlers produce.
fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code
        })),
    )
        .into_response()
}

/// Parse an optional UUID header. `Err` means the header was present
/// but malformed.
fn uuid_header(headers: &HeaderMap, name: &'static str) -> Result<Option<Uuid>, ()> {
    match headers.get(name).and_then(|v| v.to_str().ok()) {
        Some(raw) => Uuid::parse_str(raw).map(Some).map_err(|_| ()),
        None => Ok(None),
    }
}

/// Validate the X-API-Key header against the `api_keys` table and
/// attach the authenticated key plus the operation context to the request.
/// Only the sha256 of the presented key ever reaches the database.
pub async fn auth_middleware(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                "Missing X-API-Key header",
                "missing_api_key",
            )
        })?;

    let api_key_record: Option<(Uuid, String, Vec<String>, bool)> = sqlx::query_as(
        r#"
        SELECT id, name, permissions, is_active
        FROM api_keys
        WHERE key_hash = encode(sha256($1::bytea), 'hex')
        "#,
    )
    .bind(api_key.as_bytes())
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Database error during API key validation: {}", e);
        reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            "database_error",
        )
    })?;

    let (api_key_id, name, permissions, is_active) = api_key_record.ok_or_else(|| {
        reject(
            StatusCode::UNAUTHORIZED,
            "Invalid API key",
            "invalid_api_key",
        )
    })?;

    if !is_active {
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "API key is disabled",
            "api_key_disabled",
        ));
    }

    request.extensions_mut().insert(AuthenticatedApiKey {
        id: api_key_id,
        name,
        permissions,
    });

    // Teller-bound endpoints look for the TellerUser extension and fail
    // on their own if it is absent.
    let teller_user_id = uuid_header(&headers, "X-Teller-User-Id").map_err(|_| {
        reject(
            StatusCode::BAD_REQUEST,
            "Invalid X-Teller-User-Id header format",
            "invalid_teller_user_id",
        )
    })?;
    if let Some(user_id) = teller_user_id {
        request.extensions_mut().insert(TellerUser { user_id });
    }

    // Branch-bound endpoints (remittance payout/withdraw) check the context.
    let branch_id = uuid_header(&headers, "X-Branch-Id").map_err(|_| {
        reject(
            StatusCode::BAD_REQUEST,
            "Invalid X-Branch-Id header format",
            "invalid_branch_id",
        )
    })?;

    let correlation_id = headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new()
        .with_api_key(api_key_id)
        .with_correlation_id(correlation_id);
    if let Some(user_id) = teller_user_id {
        context = context.with_teller_user(user_id);
    }
    if let Some(id) = branch_id {
        context = context.with_branch(id);
    }

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Per-key rate limiting. Counting happens in the database so every
/// instance shares the same minute windows.
pub async fn rate_limit_middleware(
    State(state): State<crate::api::AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = request
        .extensions()
        .get::<AuthenticatedApiKey>()
        .cloned()
        .ok_or_else(|| {
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Auth middleware must run first",
                "internal_error",
            )
        })?;

    let allowed: bool = sqlx::query_scalar(r#"SELECT check_and_increment_rate_limit($1, $2)"#)
        .bind(api_key.id)
        .bind(state.config.rate_limit_per_minute)
        .fetch_one(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Rate limit check error: {}", e);
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Rate limit check failed",
                "database_error",
            )
        })?;

    if !allowed {
        return Err(reject(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
            "rate_limit_exceeded",
        ));
    }

    Ok(next.run(request).await)
}

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Log one line on the way in and one with status and timing on the
/// way out, keyed by correlation id.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
