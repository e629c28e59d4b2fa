//! Tests cover: query lifecycle, variable changes racing an in-flight fetch,
//! teardown while loading and failed fetches.

use super::support::{entity, quiet_context, region_schema, settle_until, Op, ScriptedRemote};
use entity_sync::{ControllerEvent, EntityController, QueryState, QueryVariables, RemoteError, SyncError};
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
    remote
}

#[tokio::test]
async fn test_disabled_controller_issues_no_query() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, region_schema());

    controller
        .set_variables(QueryVariables::new().filter_eq("id", 1))
        .await
        .unwrap();
    assert!(remote.calls().is_empty());
    assert_eq!(controller.query_state(), QueryState::Idle);

    controller.start_query(true).await.unwrap();
    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 1);
    assert_eq!(controller.query_data().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, region_schema());
    let first = remote.hold(Op::Query, "Region");

    let south = QueryVariables::new().filter_eq("label", "South");
    let (started, ()) = tokio::join!(controller.start_query(true), async {
        settle_until(|| remote.calls_of(Op::Query, "Region").len() == 1).await;
        controller.set_variables(south.clone()).await.unwrap();
        first.send(()).unwrap();
    });
    started.unwrap();

    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 2);
    let rows = controller.query_data().unwrap();
    assert_eq!(rows.as_ref(), &vec![entity(json!({"id": 2, "label": "South"}))]);
    assert_eq!(controller.query_state(), QueryState::Ready);
    assert_eq!(controller.query_variables(), south);
}

#[tokio::test]
async fn test_teardown_discards_in_flight_fetch() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, region_schema());
    let gate = remote.hold(Op::Query, "Region");

    let (started, ()) = tokio::join!(controller.start_query(true), async {
        settle_until(|| remote.calls_of(Op::Query, "Region").len() == 1).await;
        controller.teardown();
        gate.send(()).unwrap();
    });
    started.unwrap();

    assert!(controller.query_data().is_none());
    assert_eq!(controller.query_state(), QueryState::Idle);
    assert_eq!(ctx.live_controllers("Region"), 0);

    // a torn-down controller never fetches again
    controller.refetch().await.unwrap();
    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 1);
}

#[tokio::test]
async fn test_refetch_while_disabled_stays_offline() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, region_schema());

    controller.refetch().await.unwrap();
    assert!(controller.query_data().is_none());
    assert_eq!(controller.query_state(), QueryState::Idle);
    assert!(remote.calls_of(Op::Query, "Region").is_empty());

    controller.start_query(true).await.unwrap();
    controller.start_query(false).await.unwrap();
    controller.refetch().await.unwrap();
    assert_eq!(remote.calls_of(Op::Query, "Region").len(), 1);
    assert_eq!(controller.query_data().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_fetch_keeps_previous_rows() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, region_schema());
    controller.start_query(true).await.unwrap();
    let mut events = controller.subscribe_events();

    remote.fail_next(Op::Query, "Region", RemoteError::Transport("connection reset".to_string()));
    let err = controller.refetch().await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::Transport(_))));
    assert!(!err.is_local());

    assert_eq!(controller.query_state(), QueryState::Ready);
    assert_eq!(controller.query_data().unwrap().len(), 2);
    assert!(controller.last_query_error().is_some());

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        saw_failure |= matches!(event, ControllerEvent::QueryFailed(_));
    }
    assert!(saw_failure);

    controller.refetch().await.unwrap();
    assert!(controller.last_query_error().is_none());
}

#[tokio::test]
async fn test_ordered_query_with_limit() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let variables = QueryVariables::new()
        .order_by("label", entity_sync::remote::Direction::Desc)
        .limit(1);
    let controller = EntityController::with_variables(&ctx, region_schema(), variables);
    controller.start_query(true).await.unwrap();

    let rows = controller.query_data().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("label"), Some(&json!("South")));
    assert_eq!(
        remote.calls_of(Op::Query, "Region")[0].payload,
        json!({"order": [["label", "DESC"]], "limit": 1})
    );
}
