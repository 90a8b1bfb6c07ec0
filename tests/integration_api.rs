//! API Integration Tests

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware, Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use sqlx::PgPool;
use tellerpost::api::{self, AppState};
use tellerpost::Config;
use tower::util::ServiceExt;
use uuid::Uuid;

mod common;

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        database_max_connections: 5,
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "development".to_string(),
        rate_limit_per_minute: 100,
        commission_source_pct: dec!(40),
        commission_paying_pct: dec!(40),
        commission_head_office_pct: dec!(20),
    }
}

fn test_app(pool: PgPool) -> Router {
    Router::new()
        .nest("/api/v1", api::create_router())
        .layer(middleware::from_fn_with_state(
            pool.clone(),
            tellerpost::api::middleware::auth_middleware,
        ))
        .with_state(AppState {
            pool,
            config: test_config(),
        })
}

fn post(
    uri: &str,
    branch_id: Uuid,
    operator_id: Uuid,
    body: Value,
) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-API-Key", common::TEST_API_KEY)
        .header("X-Branch-Id", branch_id.to_string())
        .header("X-Teller-User-Id", operator_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn as_decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

/// Open a teller and provision its till with the given lines
async fn open_and_provision(
    app: &Router,
    branch_id: Uuid,
    operator_id: Uuid,
    lines: Value,
) -> Uuid {
    let teller_id = Uuid::new_v4();

    let req = post(
        "/api/v1/tellers",
        branch_id,
        operator_id,
        json!({
            "teller_id": teller_id,
            "branch_id": branch_id,
            "name": "Counter 1"
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "Teller open failed");

    let req = post(
        &format!("/api/v1/tellers/{}/provision", teller_id),
        branch_id,
        operator_id,
        json!({ "lines": lines, "vault_reference": "VLT-2024-001" }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK, "Provisioning failed");

    teller_id
}

#[tokio::test]
async fn test_teller_cash_e2e() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    let branch_id = Uuid::new_v4();
    let operator_id = Uuid::new_v4();

    // Open and fund the till with 10 x 100
    let teller_id = open_and_provision(
        &app,
        branch_id,
        operator_id,
        json!([{ "denomination": "100", "count": 10 }]),
    )
    .await;

    // Cash-in 350 (3 x 100 + 1 x 50)
    let req = post(
        "/api/v1/transactions/cash-in",
        branch_id,
        operator_id,
        json!({
            "teller_id": teller_id,
            "amount": "350.00",
            "lines": [
                { "denomination": "100", "count": 3 },
                { "denomination": "50", "count": 1 }
            ]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK, "Cash-in failed");
    let body = json_body(response).await;
    assert_eq!(as_decimal(&body["till_total"]), dec!(1350));

    // Cash-out 200 (2 x 100)
    let req = post(
        "/api/v1/transactions/cash-out",
        branch_id,
        operator_id,
        json!({
            "teller_id": teller_id,
            "amount": "200.00",
            "lines": [{ "denomination": "100", "count": 2 }]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK, "Cash-out failed");
    let body = json_body(response).await;
    assert_eq!(as_decimal(&body["till_total"]), dec!(1150));

    // Per-denomination balance: 11 x 100 + 1 x 50
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", teller_id))
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(as_decimal(&body["total"]), dec!(1150));
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_till_balance_unprovisioned_teller_is_zero() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    let branch_id = Uuid::new_v4();
    let operator_id = Uuid::new_v4();
    let teller_id = Uuid::new_v4();

    // Open without provisioning
    let req = post(
        "/api/v1/tellers",
        branch_id,
        operator_id,
        json!({
            "teller_id": teller_id,
            "branch_id": branch_id,
            "name": "Counter 2"
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // An empty till is a zero balance, not a missing teller
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", teller_id))
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(as_decimal(&body["total"]), Decimal::ZERO);
    assert!(body["lines"].as_array().unwrap().is_empty());

    // A teller that was never opened is still a 404
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", Uuid::new_v4()))
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cash_out_insufficient_denomination() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    let branch_id = Uuid::new_v4();
    let operator_id = Uuid::new_v4();

    let teller_id = open_and_provision(
        &app,
        branch_id,
        operator_id,
        json!([{ "denomination": "100", "count": 2 }]),
    )
    .await;

    // Till holds no 50s
    let req = post(
        "/api/v1/transactions/cash-out",
        branch_id,
        operator_id,
        json!({
            "teller_id": teller_id,
            "amount": "50.00",
            "lines": [{ "denomination": "50", "count": 1 }]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "insufficient_denomination");
}

#[tokio::test]
async fn test_idempotency_api() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    let branch_id = Uuid::new_v4();
    let operator_id = Uuid::new_v4();

    let teller_id = open_and_provision(
        &app,
        branch_id,
        operator_id,
        json!([{ "denomination": "100", "count": 10 }]),
    )
    .await;

    let idempotency_key = Uuid::new_v4();
    let cash_in = json!({
        "teller_id": teller_id,
        "amount": "350.00",
        "lines": [
            { "denomination": "100", "count": 3 },
            { "denomination": "50", "count": 1 }
        ]
    });

    // First request
    let mut req = post(
        "/api/v1/transactions/cash-in",
        branch_id,
        operator_id,
        cash_in.clone(),
    );
    req.headers_mut().insert(
        "Idempotency-Key",
        idempotency_key.to_string().parse().unwrap(),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first_body = json_body(response).await;
    let first_transaction_id = first_body["transaction_id"].as_str().unwrap().to_string();

    // Second request with the same key
    let mut req = post(
        "/api/v1/transactions/cash-in",
        branch_id,
        operator_id,
        cash_in,
    );
    req.headers_mut().insert(
        "Idempotency-Key",
        idempotency_key.to_string().parse().unwrap(),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let replay_body = json_body(response).await;
    assert_eq!(
        replay_body["transaction_id"].as_str().unwrap(),
        first_transaction_id,
        "Replay must answer with the original transaction id"
    );
    assert_eq!(as_decimal(&replay_body["till_total"]), dec!(1350));

    // Balance reflects a single posting: 1000 + 350, not 1700
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", teller_id))
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        as_decimal(&body["total"]),
        dec!(1350),
        "Replay must not post a second time"
    );
}

#[tokio::test]
async fn test_remittance_e2e() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    let source_branch_id = Uuid::new_v4();
    let paying_branch_id = Uuid::new_v4();
    let operator_id = Uuid::new_v4();

    let source_teller_id = open_and_provision(
        &app,
        source_branch_id,
        operator_id,
        json!([{ "denomination": "100", "count": 2 }]),
    )
    .await;
    let paying_teller_id = open_and_provision(
        &app,
        paying_branch_id,
        operator_id,
        json!([{ "denomination": "100", "count": 10 }]),
    )
    .await;

    // Initiate at the source branch: 500 principal + 10 charge over the counter
    let req = post(
        "/api/v1/remittances",
        source_branch_id,
        operator_id,
        json!({
            "source_teller_id": source_teller_id,
            "paying_branch_id": paying_branch_id,
            "sender_name": "Alice Sender",
            "sender_phone": "+15550001",
            "receiver_name": "Bob Receiver",
            "receiver_phone": "+15550002",
            "amount": "500.00",
            "charge": "10.00",
            "lines": [
                { "denomination": "100", "count": 5 },
                { "denomination": "10", "count": 1 }
            ]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "Initiation failed");
    let body = json_body(response).await;
    let reference = body["reference"].as_str().unwrap().to_string();
    let pickup_code = body["pickup_code"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "pending");
    assert_eq!(pickup_code.len(), 6);

    // Status lookup by reference
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/remittances/{}", reference))
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(as_decimal(&body["amount"]), dec!(500));

    // Wrong pickup code is refused
    let req = post(
        &format!("/api/v1/remittances/{}/pay", reference),
        paying_branch_id,
        operator_id,
        json!({
            "pickup_code": "000000",
            "paying_teller_id": paying_teller_id,
            "lines": [{ "denomination": "100", "count": 5 }]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Payout at the paying branch
    let req = post(
        &format!("/api/v1/remittances/{}/pay", reference),
        paying_branch_id,
        operator_id,
        json!({
            "pickup_code": pickup_code,
            "paying_teller_id": paying_teller_id,
            "lines": [{ "denomination": "100", "count": 5 }]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK, "Payout failed");
    let body = json_body(response).await;
    assert_eq!(body["status"], "paid");

    // A second collection attempt must fail
    let req = post(
        &format!("/api/v1/remittances/{}/pay", reference),
        paying_branch_id,
        operator_id,
        json!({
            "pickup_code": pickup_code,
            "paying_teller_id": paying_teller_id,
            "lines": [{ "denomination": "100", "count": 5 }]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Paying till dispensed the principal: 1000 - 500
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", paying_teller_id))
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(as_decimal(&body["total"]), dec!(500));
}

#[tokio::test]
async fn test_remittance_withdraw() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    let source_branch_id = Uuid::new_v4();
    let paying_branch_id = Uuid::new_v4();
    let operator_id = Uuid::new_v4();

    let source_teller_id = open_and_provision(
        &app,
        source_branch_id,
        operator_id,
        json!([{ "denomination": "100", "count": 1 }]),
    )
    .await;

    let req = post(
        "/api/v1/remittances",
        source_branch_id,
        operator_id,
        json!({
            "source_teller_id": source_teller_id,
            "paying_branch_id": paying_branch_id,
            "sender_name": "Alice Sender",
            "sender_phone": "+15550001",
            "receiver_name": "Bob Receiver",
            "receiver_phone": "+15550002",
            "amount": "200.00",
            "charge": "5.00",
            "lines": [
                { "denomination": "100", "count": 2 },
                { "denomination": "5", "count": 1 }
            ]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let reference = body["reference"].as_str().unwrap().to_string();

    // Withdrawal from the paying branch is refused
    let req = post(
        &format!("/api/v1/remittances/{}/withdraw", reference),
        paying_branch_id,
        operator_id,
        json!({
            "refunding_teller_id": source_teller_id,
            "lines": [
                { "denomination": "100", "count": 2 },
                { "denomination": "5", "count": 1 }
            ]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Sender cancels at the source branch; principal + full charge refunded
    let req = post(
        &format!("/api/v1/remittances/{}/withdraw", reference),
        source_branch_id,
        operator_id,
        json!({
            "refunding_teller_id": source_teller_id,
            "lines": [
                { "denomination": "100", "count": 2 },
                { "denomination": "5", "count": 1 }
            ]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK, "Withdrawal failed");
    let body = json_body(response).await;
    assert_eq!(body["status"], "withdrawn");
    assert_eq!(as_decimal(&body["refund_total"]), dec!(205));

    // Till is back where it started: the original 100
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", source_teller_id))
        .header("X-API-Key", common::TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(as_decimal(&body["total"]), dec!(100));
}

#[tokio::test]
async fn test_bulk_cash_partial_failure() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    let branch_id = Uuid::new_v4();
    let operator_id = Uuid::new_v4();

    let teller_id = open_and_provision(
        &app,
        branch_id,
        operator_id,
        json!([{ "denomination": "100", "count": 3 }]),
    )
    .await;

    // Second item asks for 20s the till never held; the rest still post
    let req = post(
        "/api/v1/transactions/bulk",
        branch_id,
        operator_id,
        json!({
            "teller_id": teller_id,
            "items": [
                {
                    "direction": "cash_in",
                    "amount": "100.00",
                    "lines": [{ "denomination": "100", "count": 1 }]
                },
                {
                    "direction": "cash_out",
                    "amount": "40.00",
                    "lines": [{ "denomination": "20", "count": 2 }]
                },
                {
                    "direction": "cash_out",
                    "amount": "200.00",
                    "lines": [{ "denomination": "100", "count": 2 }]
                }
            ]
        }),
    );
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["posted"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(as_decimal(&body["till_total"]), dec!(200));

    let outcomes = body["outcomes"].as_array().unwrap();
    assert_eq!(outcomes[0]["status"], "posted");
    assert_eq!(outcomes[1]["status"], "failed");
    assert_eq!(outcomes[1]["reason"], "insufficient_denomination");
    assert_eq!(outcomes[2]["status"], "posted");
}

fn rate_limited_app(pool: PgPool, per_minute: i32) -> Router {
    let mut config = test_config();
    config.rate_limit_per_minute = per_minute;
    let state = AppState {
        pool: pool.clone(),
        config,
    };
    Router::new()
        .nest("/api/v1", api::create_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tellerpost::api::middleware::rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            pool,
            tellerpost::api::middleware::auth_middleware,
        ))
        .with_state(state)
}

#[tokio::test]
async fn test_rate_limit_uses_configured_limit() {
    let pool = common::setup_test_db().await;
    let app = rate_limited_app(pool, 2);

    let uri = format!("/api/v1/tellers/{}/balance", Uuid::new_v4());
    let request = |uri: &str| {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("X-API-Key", common::TEST_API_KEY)
            .body(Body::empty())
            .unwrap()
    };

    // The first two requests pass the limiter (and then 404 on the
    // unknown teller); the third is cut off
    for _ in 0..2 {
        let response = app.clone().oneshot(request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app.clone().oneshot(request(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "rate_limit_exceeded");
}

#[tokio::test]
async fn test_auth_required() {
    let pool = common::setup_test_db().await;
    let app = test_app(pool);

    // No API key
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown API key
    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/tellers/{}/balance", Uuid::new_v4()))
        .header("X-API-Key", "wrong_key")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
