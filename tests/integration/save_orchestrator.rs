//! Tests cover: nested saves completing before the parent mutation, the
//! parent dispatched exactly once, a failing child cancelling the parent
//! without leaking into the next save, and the parent sending the reference
//! to whatever its children saved.

use super::support::{
    customer_schema, entity, line_schema, order_schema, quiet_context, region_schema, settle_until, Op,
    ScriptedRemote,
};
use entity_sync::orchestrator::SaveCycle;
use entity_sync::{EntityController, RemoteError, SyncError};
use serde_json::{json, Value};
use std::sync::Arc;

fn seeded() -> Arc<ScriptedRemote> {
    let remote = ScriptedRemote::new();
    remote.inner.seed(
        "Order",
        vec![entity(json!({"id": 1, "note": "first", "lines": [{"id": 1}, {"id": 2}, {"id": 3}]}))],
    );
    remote.inner.seed(
        "Line",
        vec![
            entity(json!({"id": 1, "qty": 1})),
            entity(json!({"id": 2, "qty": 1})),
            entity(json!({"id": 3, "qty": 1})),
        ],
    );
    remote
}

fn lines(quantities: [i64; 3]) -> Value {
    json!([
        {"id": 1, "qty": quantities[0]},
        {"id": 2, "qty": quantities[1]},
        {"id": 3, "qty": quantities[2]},
    ])
}

fn position(remote: &ScriptedRemote, op: Op, type_name: &str) -> Vec<usize> {
    remote
        .calls()
        .iter()
        .enumerate()
        .filter(|(_, call)| call.op == op && call.type_name == type_name)
        .map(|(index, _)| index)
        .collect()
}

#[tokio::test]
async fn test_parent_waits_for_every_child() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let order = EntityController::new(&ctx, order_schema());
    let _lines = EntityController::nested(&ctx, line_schema(), &order, "lines", &lines([1, 1, 1])).unwrap();
    let gates: Vec<_> = (0..3).map(|_| remote.hold(Op::Update, "Line")).collect();

    let original = entity(json!({"id": 1, "note": "first", "lines": lines([1, 1, 1])}));
    let edited = entity(json!({"id": 1, "note": "second", "lines": lines([4, 5, 6])}));

    let (saved, ()) = tokio::join!(order.update_save(edited, original), async {
        settle_until(|| remote.calls_of(Op::Update, "Line").len() == 3).await;
        // released in reverse dispatch order
        for gate in gates.into_iter().rev() {
            assert!(remote.calls_of(Op::Update, "Order").is_empty());
            gate.send(()).unwrap();
            tokio::task::yield_now().await;
        }
    });
    let saved = saved.unwrap();
    assert_eq!(saved.len(), 1);

    let parent = remote.calls_of(Op::Update, "Order");
    assert_eq!(parent.len(), 1);
    // unchanged references are not resent with the parent
    assert_eq!(parent[0].payload, json!({"changes": {"note": "second"}, "filter": [{"id": 1}]}));
    let last_child = *position(&remote, Op::Update, "Line").last().unwrap();
    assert!(position(&remote, Op::Update, "Order")[0] > last_child);

    let quantities: Vec<Value> = remote
        .inner
        .rows("Line")
        .iter()
        .map(|row| row.get("qty").cloned().unwrap_or(Value::Null))
        .collect();
    assert_eq!(quantities, vec![json!(4), json!(5), json!(6)]);
}

#[tokio::test]
async fn test_failed_child_cancels_parent() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let order = EntityController::new(&ctx, order_schema());
    let _lines = EntityController::nested(&ctx, line_schema(), &order, "lines", &lines([1, 1, 1])).unwrap();
    remote.fail_next(Op::Update, "Line", RemoteError::Rejected("qty out of range".to_string()));

    let original = entity(json!({"id": 1, "note": "first", "lines": lines([1, 1, 1])}));
    let edited = entity(json!({"id": 1, "note": "second", "lines": lines([4, 5, 6])}));
    let err = order.update_save(edited, original).await.unwrap_err();

    match err {
        SyncError::Orchestration { field, source } => {
            assert_eq!(field, "lines");
            assert!(matches!(*source, SyncError::Remote(RemoteError::Rejected(_))));
        }
        other => panic!("expected orchestration error, got {:?}", other),
    }
    // the other children still ran to completion
    assert_eq!(remote.calls_of(Op::Update, "Line").len(), 3);
    assert!(remote.calls_of(Op::Update, "Order").is_empty());

    // the next save starts a fresh cycle
    let original = entity(json!({"id": 1, "note": "first", "lines": lines([1, 1, 1])}));
    let edited = entity(json!({"id": 1, "note": "second", "lines": lines([4, 5, 6])}));
    let saved = order.update_save(edited, original).await.unwrap();
    assert_eq!(saved.len(), 1);

    assert_eq!(remote.calls_of(Op::Update, "Line").len(), 6);
    let parent = remote.calls_of(Op::Update, "Order");
    assert_eq!(parent.len(), 1);
    assert_eq!(parent[0].payload, json!({"changes": {"note": "second"}, "filter": [{"id": 1}]}));
    let last_child = *position(&remote, Op::Update, "Line").last().unwrap();
    assert!(position(&remote, Op::Update, "Order")[0] > last_child);

    let quantities: Vec<Value> = remote
        .inner
        .rows("Line")
        .iter()
        .map(|row| row.get("qty").cloned().unwrap_or(Value::Null))
        .collect();
    assert_eq!(quantities, vec![json!(4), json!(5), json!(6)]);
}

#[tokio::test]
async fn test_only_nested_changes_still_dispatch_parent_once() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let order = EntityController::new(&ctx, order_schema());
    let _lines = EntityController::nested(&ctx, line_schema(), &order, "lines", &lines([1, 1, 1])).unwrap();

    let original = entity(json!({"id": 1, "note": "first", "lines": lines([1, 1, 1])}));
    let edited = entity(json!({"id": 1, "note": "first", "lines": lines([1, 2, 1])}));
    order.update_save(edited, original).await.unwrap();

    assert_eq!(remote.calls_of(Op::Update, "Line").len(), 1);
    let parent = remote.calls_of(Op::Update, "Order");
    assert_eq!(parent.len(), 1);
    assert_eq!(parent[0].payload["changes"], json!({}));
}

#[tokio::test]
async fn test_new_nested_entry_is_created() {
    let remote = ScriptedRemote::new();
    remote
        .inner
        .seed("Customer", vec![entity(json!({"id": 10, "name": "Ann", "region": null}))]);
    let ctx = quiet_context(&remote);
    let customers = EntityController::new(&ctx, customer_schema());
    let _region = EntityController::nested(&ctx, region_schema(), &customers, "region", &json!([])).unwrap();

    let original = entity(json!({"id": 10, "name": "Ann", "region": null}));
    let edited = entity(json!({"id": 10, "name": "Ann", "region": {"label": "West"}}));
    customers.update_save(edited, original).await.unwrap();

    let creates = remote.calls_of(Op::Create, "Region");
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].payload, json!({"label": "West"}));

    let region_id = remote.inner.rows("Region")[0].get("id").cloned().unwrap();
    let parent = remote.calls_of(Op::Update, "Customer");
    assert_eq!(parent.len(), 1);
    assert_eq!(
        parent[0].payload,
        json!({"changes": {"region": {"id": region_id.clone()}}, "filter": [{"id": 10}]})
    );
    assert_eq!(
        remote.inner.rows("Customer")[0].get("region"),
        Some(&json!({"id": region_id}))
    );
}

fn linked_customer() -> Arc<ScriptedRemote> {
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

#[tokio::test]
async fn test_relinked_reference_is_saved_on_parent() {
    let remote = linked_customer();
    let ctx = quiet_context(&remote);
    let customers = EntityController::new(&ctx, customer_schema());
    let _region = EntityController::nested(&ctx, region_schema(), &customers, "region", &json!({"id": 1})).unwrap();

    let original = entity(json!({"id": 10, "name": "Ann", "region": {"id": 1, "label": "North"}}));
    let edited = entity(json!({"id": 10, "name": "Ann", "region": {"id": 2, "label": "South"}}));
    customers.update_save(edited, original).await.unwrap();

    // linking to an existing row does not write the row itself
    assert!(remote.calls_of(Op::Update, "Region").is_empty());
    let parent = remote.calls_of(Op::Update, "Customer");
    assert_eq!(parent.len(), 1);
    assert_eq!(
        parent[0].payload,
        json!({"changes": {"region": {"id": 2}}, "filter": [{"id": 10}]})
    );
    assert_eq!(remote.inner.rows("Customer")[0].get("region"), Some(&json!({"id": 2})));
}

#[tokio::test]
async fn test_unlinked_reference_is_cleared_on_parent() {
    let remote = linked_customer();
    let ctx = quiet_context(&remote);
    let customers = EntityController::new(&ctx, customer_schema());
    let _region = EntityController::nested(&ctx, region_schema(), &customers, "region", &json!({"id": 1})).unwrap();

    let original = entity(json!({"id": 10, "name": "Ann", "region": {"id": 1}}));
    let edited = entity(json!({"id": 10, "name": "Ann", "region": null}));
    customers.update_save(edited, original).await.unwrap();

    let parent = remote.calls_of(Op::Update, "Customer");
    assert_eq!(parent.len(), 1);
    assert_eq!(
        parent[0].payload,
        json!({"changes": {"region": null}, "filter": [{"id": 10}]})
    );
    assert_eq!(remote.inner.rows("Customer")[0].get("region"), Some(&Value::Null));
    // the unlinked row itself is kept
    assert_eq!(remote.inner.rows("Region").len(), 2);
}

#[tokio::test]
async fn test_edited_nested_row_keeps_parent_reference() {
    let remote = linked_customer();
    let ctx = quiet_context(&remote);
    let customers = EntityController::new(&ctx, customer_schema());
    let _region = EntityController::nested(&ctx, region_schema(), &customers, "region", &json!({"id": 1})).unwrap();

    let original = entity(json!({"id": 10, "name": "Ann", "region": {"id": 1, "label": "North"}}));
    let edited = entity(json!({"id": 10, "name": "Ann", "region": {"id": 1, "label": "Far North"}}));
    customers.update_save(edited, original).await.unwrap();

    let child = remote.calls_of(Op::Update, "Region");
    assert_eq!(child.len(), 1);
    assert_eq!(
        child[0].payload,
        json!({"changes": {"label": "Far North"}, "filter": [{"id": 1}]})
    );
    let parent = remote.calls_of(Op::Update, "Customer");
    assert_eq!(parent.len(), 1);
    assert_eq!(parent[0].payload["changes"], json!({}));
}

#[test]
fn test_save_cycle_fires_once() {
    let (cycle, mut fired) = SaveCycle::new(2);
    assert!(!cycle.report_completion());
    assert!(fired.try_recv().is_err());
    assert!(cycle.report_completion());
    assert!(fired.try_recv().is_ok());
    assert!(!cycle.report_completion());
    assert_eq!(cycle.completed(), 3);
}
