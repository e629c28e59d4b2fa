//! Tests cover: local validation before any network call, create/update/delete
//! applied to the result list without status tags, and failed mutations.

use super::support::{customer_schema, entity, quiet_context, region_schema, Op, ScriptedRemote};
use entity_sync::{
    ControllerEvent, EntityController, Identity, MutationKind, RemoteError, SyncError, ValidationError,
};
use serde_json::json;
use std::sync::Arc;

fn seeded() -> Arc<ScriptedRemote> {
    let remote = ScriptedRemote::new();
    remote
        .inner
        .seed("Region", vec![entity(json!({"id": 1, "label": "North"}))]);
    remote.inner.seed(
        "Customer",
        vec![entity(json!({"id": 10, "name": "Ann", "region": {"id": 1}}))],
    );
    remote
}

#[tokio::test]
async fn test_missing_mandatory_field_never_reaches_remote() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, customer_schema());

    let err = controller
        .create_save(entity(json!({"name": "", "region": {"id": 1}})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Validation(ValidationError::MissingMandatory { ref field, .. }) if field == "name"
    ));
    assert!(err.is_local());
    assert!(remote.calls().is_empty());
    assert!(!controller.mutation_pending(MutationKind::Create));

    assert!(controller
        .validate_create(&entity(json!({"name": "Bea"})))
        .is_ok());
}

#[tokio::test]
async fn test_unknown_field_rejected_on_update() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, customer_schema());
    let original = entity(json!({"id": 10, "name": "Ann"}));

    let err = controller
        .update_save(entity(json!({"id": 10, "name": "Ann", "vip": true})), original)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(ValidationError::UnknownField { .. })));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_create_sends_reference_identities_only() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, customer_schema());
    controller.start_query(true).await.unwrap();

    let created = controller
        .create_save(entity(json!({"name": "Bea", "region": {"id": 1, "label": "North"}})))
        .await
        .unwrap();

    let creates = remote.calls_of(Op::Create, "Customer");
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].payload, json!({"name": "Bea", "region": {"id": 1}}));
    assert!(created.get("id").is_some());

    assert_eq!(controller.query_data().unwrap().len(), 2);
    assert!(controller.statuses().is_empty());
}

#[tokio::test]
async fn test_update_sends_only_changed_fields() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, customer_schema());
    controller.start_query(true).await.unwrap();
    let original = entity(json!({"id": 10, "name": "Ann", "region": {"id": 1}}));

    let updated = controller
        .update_save(entity(json!({"id": 10, "name": "Anna", "region": {"id": 1}})), original)
        .await
        .unwrap();
    assert_eq!(updated.len(), 1);

    let updates = remote.calls_of(Op::Update, "Customer");
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].payload,
        json!({"changes": {"name": "Anna"}, "filter": [{"id": 10}]})
    );
    let rows = controller.query_data().unwrap();
    assert_eq!(rows[0].get("name"), Some(&json!("Anna")));
    assert!(controller.statuses().is_empty());
}

#[tokio::test]
async fn test_delete_removes_row() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, customer_schema());
    controller.start_query(true).await.unwrap();

    let deleted = controller
        .delete(&entity(json!({"id": 10, "name": "Ann"})))
        .await
        .unwrap();
    assert_eq!(deleted, vec![Identity::single("id", 10)]);
    assert_eq!(remote.calls_of(Op::Delete, "Customer")[0].payload, json!([{"id": 10}]));
    assert!(controller.query_data().unwrap().is_empty());
    assert!(remote.inner.rows("Customer").is_empty());
}

#[tokio::test]
async fn test_rejected_mutation_is_recorded() {
    let remote = seeded();
    let ctx = quiet_context(&remote);
    let controller = EntityController::new(&ctx, region_schema());
    controller.start_query(true).await.unwrap();
    let mut events = controller.subscribe_events();

    remote.fail_next(Op::Create, "Region", RemoteError::Rejected("label taken".to_string()));
    let err = controller
        .create_save(entity(json!({"label": "North"})))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::Rejected(_))));
    assert_eq!(remote.calls_of(Op::Create, "Region").len(), 1);

    assert!(matches!(
        controller.last_mutation_error(),
        Some(SyncError::Remote(RemoteError::Rejected(_)))
    ));
    assert!(!controller.mutation_pending(MutationKind::Create));
    assert_eq!(controller.query_data().unwrap().len(), 1);

    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        if let ControllerEvent::MutationFinished { kind, succeeded } = event {
            finished = Some((kind, succeeded));
        }
    }
    assert_eq!(finished, Some((MutationKind::Create, false)));
}
