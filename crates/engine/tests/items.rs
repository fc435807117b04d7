//! Ticket items: nested records with their own type and optional machine.

mod support;

use serde_json::json;

use ticketflow_core::{DefinitionScope, TypeDefinitionId};
use ticketflow_engine::{LifecycleError, NewItem};

use support::{note_document, part_document, repair_document, with_nested, Fixture};

struct ItemTypes {
    part: TypeDefinitionId,
    note: TypeDefinitionId,
}

async fn nest_items(fx: &Fixture) -> ItemTypes {
    let registry = fx.engine.registry();
    let scope = DefinitionScope::Tenant(fx.tenant);
    let part = registry.register(scope, part_document()).await.unwrap().id();
    let note = registry.register(scope, note_document()).await.unwrap().id();
    registry
        .update(scope, fx.repair, with_nested(repair_document(), &[part, note]))
        .await
        .unwrap();
    ItemTypes { part, note }
}

fn item(type_definition_id: TypeDefinitionId, payload: serde_json::Value) -> NewItem {
    NewItem {
        type_definition_id,
        payload,
        created_by: None,
    }
}

#[tokio::test]
async fn stateful_item_follows_its_own_machine() {
    let fx = Fixture::new().await;
    let types = nest_items(&fx).await;
    let ticket = fx.create("Ada").await;
    let lifecycle = fx.engine.lifecycle();

    let part = lifecycle
        .add_item(fx.tenant, ticket.id, item(types.part, json!({ "sku": "BAT-01" })))
        .await
        .unwrap();
    assert_eq!(part.current_state.as_deref(), Some("ordered"));

    let outcome = lifecycle
        .transition_item(fx.tenant, part.id, "deliver", None)
        .await
        .unwrap();
    assert_eq!(outcome.previous_state, "ordered");
    assert_eq!(outcome.current_state, "delivered");
    assert_eq!(outcome.item.version, 1);

    let err = lifecycle
        .transition_item(fx.tenant, part.id, "deliver", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }), "{err}");

    let history = fx.engine.audit().item_history(fx.tenant, part.id).await.unwrap();
    let states: Vec<_> = history.iter().map(|r| r.new_state.as_str()).collect();
    assert_eq!(states, ["ordered", "delivered"]);
    assert!(history.iter().all(|r| r.item_id == Some(part.id)));

    // The ticket's own history and state are untouched.
    let ticket_history = fx.engine.audit().history(fx.tenant, ticket.id).await.unwrap();
    assert_eq!(ticket_history.len(), 1);
    fx.assert_consistent(ticket.id).await;
}

#[tokio::test]
async fn stateless_item_never_transitions() {
    let fx = Fixture::new().await;
    let types = nest_items(&fx).await;
    let ticket = fx.create("Ada").await;
    let lifecycle = fx.engine.lifecycle();

    let note = lifecycle
        .add_item(fx.tenant, ticket.id, item(types.note, json!({ "text": "scratched" })))
        .await
        .unwrap();
    assert_eq!(note.current_state, None);
    assert_eq!(note.state_entered_at, None);

    let err = lifecycle
        .transition_item(fx.tenant, note.id, "deliver", None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::UnknownTransition {
            transition: "deliver".into()
        }
    );
    let stored = lifecycle.get_item(fx.tenant, note.id).await.unwrap();
    assert_eq!(stored.current_state, None);
    assert!(fx
        .engine
        .audit()
        .item_history(fx.tenant, note.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn item_payload_is_validated() {
    let fx = Fixture::new().await;
    let types = nest_items(&fx).await;
    let ticket = fx.create("Ada").await;

    let err = fx
        .engine
        .lifecycle()
        .add_item(fx.tenant, ticket.id, item(types.part, json!({ "qty": 2 })))
        .await
        .unwrap_err();
    match err {
        LifecycleError::Validation(violation) => assert_eq!(violation.field_path, "/sku"),
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert!(fx
        .engine
        .lifecycle()
        .list_items(fx.tenant, ticket.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn only_nested_item_types_are_accepted() {
    let fx = Fixture::new().await;
    nest_items(&fx).await;
    let mut stray = part_document();
    stray.type_code = "sticker".into();
    let stray = fx
        .engine
        .registry()
        .register(DefinitionScope::Tenant(fx.tenant), stray)
        .await
        .unwrap()
        .id();
    let ticket = fx.create("Ada").await;

    let err = fx
        .engine
        .lifecycle()
        .add_item(fx.tenant, ticket.id, item(stray, json!({ "sku": "S-1" })))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidRequest { .. }), "{err}");
}

#[tokio::test]
async fn unlisting_an_item_type_keeps_existing_items() {
    let fx = Fixture::new().await;
    let types = nest_items(&fx).await;
    let ticket = fx.create("Ada").await;
    let lifecycle = fx.engine.lifecycle();
    let existing = lifecycle
        .add_item(fx.tenant, ticket.id, item(types.part, json!({ "sku": "BAT-01" })))
        .await
        .unwrap();

    fx.engine
        .registry()
        .update(
            DefinitionScope::Tenant(fx.tenant),
            fx.repair,
            with_nested(repair_document(), &[types.note]),
        )
        .await
        .unwrap();

    let err = lifecycle
        .add_item(fx.tenant, ticket.id, item(types.part, json!({ "sku": "BAT-02" })))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidRequest { .. }), "{err}");

    let outcome = lifecycle
        .transition_item(fx.tenant, existing.id, "deliver", None)
        .await
        .unwrap();
    assert_eq!(outcome.current_state, "delivered");
    let items = lifecycle.list_items(fx.tenant, ticket.id).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn items_are_listed_in_creation_order_and_tenant_checked() {
    let fx = Fixture::new().await;
    let types = nest_items(&fx).await;
    let (other, _, _) = fx.other_tenant().await;
    let ticket = fx.create("Ada").await;
    let lifecycle = fx.engine.lifecycle();

    let first = lifecycle
        .add_item(fx.tenant, ticket.id, item(types.part, json!({ "sku": "A" })))
        .await
        .unwrap();
    let second = lifecycle
        .add_item(fx.tenant, ticket.id, item(types.note, json!(null)))
        .await
        .unwrap();
    let ids: Vec<_> = lifecycle
        .list_items(fx.tenant, ticket.id)
        .await
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let err = lifecycle.get_item(other, first.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden { .. }), "{err}");
    let err = lifecycle
        .transition_item(other, first.id, "deliver", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden { .. }), "{err}");
}
