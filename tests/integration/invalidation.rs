//! Tests cover: controllers of related types refetching after a local
//! mutation, the mutating controller skipping itself, and disabled or
//! torn-down controllers being left alone.

use super::support::{
    customer_schema, entity, quiet_context, region_schema, settle_until, wait_for, Op, ScriptedRemote,
};
use entity_sync::{ControllerEvent, EntityController, EntityStatus, Identity, PushEvent, QueryState};
use serde_json::json;
use std::sync::Arc;

fn seeded() -> Arc<ScriptedRemote> {
    let remote = ScriptedRemote::new();
    remote.inner.seed(
        "Region",
        vec![
            entity(json!({"id": 1, "label": "North"})),
            entity(json!({"id": 2, "label": "South"})),
        ],
    );
    remote.inner.seed(
        "Customer",
        vec![entity(json!({"id": 10, "name": "Ann", "region": {"id": 1}}))],
    );
    remote
}

async fn yield_a_while() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_changed_reference_refetches_target_type() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let customers = EntityController::new(&ctx, customer_schema());
    let regions = EntityController::new(&ctx, region_schema());
    customers.start_query(true).await.unwrap();
    regions.start_query(true).await.unwrap();
    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 1);
    let mut region_events = regions.subscribe_events();

    let original = entity(json!({"id": 10, "name": "Ann", "region": {"id": 1}}));
    customers
        .update_save(entity(json!({"id": 10, "name": "Ann", "region": {"id": 2}})), original)
        .await
        .unwrap();

    wait_for(&mut region_events, |event| {
        matches!(event, ControllerEvent::QueryStateChanged(QueryState::Loading))
    })
    .await;
    wait_for(&mut region_events, |event| {
        matches!(event, ControllerEvent::QueryStateChanged(QueryState::Ready))
    })
    .await;
    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 2);
    // the mutating controller patched itself instead of refetching
    assert_eq!(remote.calls_of(Op::Query, "Customer").len(), 1);
}

#[tokio::test]
async fn test_unchanged_reference_does_not_refetch_target() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let customers = EntityController::new(&ctx, customer_schema());
    let regions = EntityController::new(&ctx, region_schema());
    customers.start_query(true).await.unwrap();
    regions.start_query(true).await.unwrap();

    let original = entity(json!({"id": 10, "name": "Ann", "region": {"id": 1}}));
    customers
        .update_save(entity(json!({"id": 10, "name": "Anna", "region": {"id": 1}})), original)
        .await
        .unwrap();
    yield_a_while().await;
    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 1);
}

#[tokio::test]
async fn test_create_refetches_other_controllers_of_same_type() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let writer = EntityController::new(&ctx, customer_schema());
    let reader = EntityController::new(&ctx, customer_schema());
    let regions = EntityController::new(&ctx, region_schema());
    writer.start_query(true).await.unwrap();
    reader.start_query(true).await.unwrap();
    regions.start_query(true).await.unwrap();
    let mut reader_events = reader.subscribe_events();
    let mut region_events = regions.subscribe_events();

    writer
        .create_save(entity(json!({"name": "Bea", "region": {"id": 2}})))
        .await
        .unwrap();

    wait_for(&mut reader_events, |event| matches!(event, ControllerEvent::DataChanged { rows: 2 })).await;
    wait_for(&mut region_events, |event| matches!(event, ControllerEvent::DataChanged { .. })).await;
    yield_a_while().await;

    assert_eq!(reader.query_data().unwrap().len(), 2);
    assert_eq!(writer.query_data().unwrap().len(), 2);
    // two initial queries plus the reader's refetch
    assert_eq!(remote.calls_of(Op::Query, "Customer").len(), 3);
}

#[tokio::test]
async fn test_disabled_and_torn_down_controllers_are_skipped() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let disabled = EntityController::new(&ctx, region_schema());
    let gone = EntityController::new(&ctx, region_schema());
    gone.start_query(true).await.unwrap();
    gone.teardown();

    let invalidation = ctx.invalidate("Region");
    assert!(invalidation.is_empty());
    assert_eq!(invalidation.settled().await, 0);
    assert!(!disabled.is_enabled());
    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 1);
}

#[tokio::test]
async fn test_invalidation_keeps_tags_of_rows_still_present() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let regions = EntityController::new(&ctx, region_schema());
    regions.start_query(true).await.unwrap();

    regions.apply_push(PushEvent::Updated(vec![entity(json!({"id": 1, "label": "Far North"}))]));
    regions.apply_push(PushEvent::Deleted(vec![Identity::single("id", 2)]));
    remote.inner.publish(
        &region_schema(),
        PushEvent::Deleted(vec![Identity::single("id", 2)]),
    );

    let invalidation = ctx.invalidate("Region");
    assert_eq!(invalidation.len(), 1);
    assert_eq!(invalidation.settled().await, 0);
    settle_until(|| remote.calls_of(Op::Query, "Region").len() == 2).await;

    assert_eq!(regions.query_data().unwrap().len(), 1);
    assert_eq!(regions.status(&Identity::single("id", 1)), Some(EntityStatus::Updated));
    assert_eq!(regions.status(&Identity::single("id", 2)), None);
}
