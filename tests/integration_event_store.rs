//! Integration tests for Event Store

use chrono::Utc;
use tellerpost::aggregate::{Aggregate, Teller};
use tellerpost::domain::{OperationContext, TellerEvent};
use tellerpost::event_store::{AggregateOperation, EventStore};
use uuid::Uuid;

mod common;

fn opened_event(teller_id: Uuid) -> TellerEvent {
    TellerEvent::TellerOpened {
        teller_id,
        branch_id: Uuid::new_v4(),
        operator_user_id: Uuid::new_v4(),
        name: "Counter 1".to_string(),
        opened_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_event_store_append_and_load() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let teller_id = Uuid::new_v4();
    let event = opened_event(teller_id);

    let op = AggregateOperation::new(
        "Teller",
        teller_id,
        0, // expected version
        "TellerOpened",
        &event,
    )
    .unwrap();

    let context = OperationContext::new().with_correlation_id(Uuid::new_v4());

    // Append event
    let outcome = event_store
        .append_atomic(vec![op], None, &context)
        .await
        .unwrap();
    assert_eq!(outcome.event_ids.len(), 1);
    assert!(!outcome.replayed);

    // Load events
    let events = event_store.get_events(teller_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "TellerOpened");
    assert_eq!(events[0].version, 1);

    // Rehydrate the aggregate
    let teller: Teller = event_store
        .load_aggregate(teller_id)
        .await
        .unwrap()
        .expect("Teller should exist");
    assert_eq!(teller.id(), teller_id);
    assert_eq!(teller.version(), 1);
    assert!(teller.is_open());
}

#[tokio::test]
async fn test_event_store_concurrency_conflict() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let teller_id = Uuid::new_v4();
    let event1 = opened_event(teller_id);

    let op1 = AggregateOperation::new("Teller", teller_id, 0, "TellerOpened", &event1).unwrap();
    let context = OperationContext::new().with_correlation_id(Uuid::new_v4());

    event_store
        .append_atomic(vec![op1], None, &context)
        .await
        .unwrap();

    // Try to append with wrong expected version (should fail)
    let event2 = TellerEvent::TellerClosed {
        teller_id,
        closing_drawer: tellerpost::domain::CashDrawer::new(),
        closed_at: Utc::now(),
    };

    let op2 = AggregateOperation::new("Teller", teller_id, 0, "TellerClosed", &event2).unwrap(); // Wrong version!

    let result = event_store.append_atomic(vec![op2], None, &context).await;
    assert!(result.is_err(), "Should fail due to version conflict");
}

#[tokio::test]
async fn test_event_store_concurrent_appends_single_winner() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let teller_id = Uuid::new_v4();
    let context = OperationContext::new().with_correlation_id(Uuid::new_v4());

    let open = AggregateOperation::new(
        "Teller",
        teller_id,
        0,
        "TellerOpened",
        &opened_event(teller_id),
    )
    .unwrap();
    event_store
        .append_atomic(vec![open], None, &context)
        .await
        .unwrap();

    // Two racing appends, both against the version they just read
    let closed = || TellerEvent::TellerClosed {
        teller_id,
        closing_drawer: tellerpost::domain::CashDrawer::new(),
        closed_at: Utc::now(),
    };
    let op_a = AggregateOperation::new("Teller", teller_id, 1, "TellerClosed", &closed()).unwrap();
    let op_b = AggregateOperation::new("Teller", teller_id, 1, "TellerClosed", &closed()).unwrap();

    let store_a = event_store.clone();
    let store_b = event_store.clone();
    let ctx_a = context.clone();
    let ctx_b = context.clone();

    let (a, b) = tokio::join!(
        tokio::spawn(async move { store_a.append_atomic(vec![op_a], None, &ctx_a).await }),
        tokio::spawn(async move { store_b.append_atomic(vec![op_b], None, &ctx_b).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one racing append may commit");

    // The stream holds one event at version 2, not two
    let events = event_store.get_events(teller_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events.last().unwrap().version, 2);
}

#[tokio::test]
async fn test_event_store_idempotency_key_replay() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let teller_id = Uuid::new_v4();
    let key = Uuid::new_v4();
    let context = OperationContext::new().with_correlation_id(Uuid::new_v4());

    let op = AggregateOperation::new(
        "Teller",
        teller_id,
        0,
        "TellerOpened",
        &opened_event(teller_id),
    )
    .unwrap();

    let first = event_store
        .append_atomic(vec![op], Some(key), &context)
        .await
        .unwrap();
    assert_eq!(first.event_ids.len(), 1);
    assert!(!first.replayed);

    // Same key again with a fresh operation must not append a second event
    let replay_op = AggregateOperation::new(
        "Teller",
        teller_id,
        1,
        "TellerOpened",
        &opened_event(teller_id),
    )
    .unwrap();

    let replay = event_store
        .append_atomic(vec![replay_op], Some(key), &context)
        .await
        .unwrap();

    // The stored event id comes back instead of a new append
    assert!(replay.replayed);
    assert_eq!(replay.event_ids, first.event_ids);

    let events = event_store.get_events(teller_id).await.unwrap();
    assert_eq!(events.len(), 1);
}
