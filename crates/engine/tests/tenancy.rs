//! Tenant isolation: every path checks the caller's tenant against the
//! owner of what it touches.

mod support;

use serde_json::json;

use ticketflow_core::{DefinitionScope, TypeDefinitionDocument};
use ticketflow_engine::{LifecycleError, NewTicket, QueueQuery};
use ticketflow_storage::TicketStorage;

use support::{repair_document, Fixture};

fn is_forbidden(err: &LifecycleError) -> bool {
    matches!(err, LifecycleError::Forbidden { .. })
}

#[tokio::test]
async fn foreign_ticket_is_forbidden_on_every_path() {
    let fx = Fixture::new().await;
    let (other, other_queue, _) = fx.other_tenant().await;
    let ticket = fx.create("Ada").await;
    let lifecycle = fx.engine.lifecycle();

    let err = lifecycle
        .transition_ticket(other, ticket.id, "start", None)
        .await
        .unwrap_err();
    assert!(is_forbidden(&err), "{err}");
    assert!(is_forbidden(&lifecycle.get_ticket(other, ticket.id).await.unwrap_err()));
    assert!(is_forbidden(
        &lifecycle.cancel_ticket(other, ticket.id, None, None).await.unwrap_err()
    ));
    assert!(is_forbidden(
        &lifecycle
            .forward_ticket(other, ticket.id, other_queue, None, None)
            .await
            .unwrap_err()
    ));
    assert!(is_forbidden(
        &lifecycle
            .reorder_ticket(other, ticket.id, 0, None, None)
            .await
            .unwrap_err()
    ));
    assert!(is_forbidden(&fx.engine.audit().history(other, ticket.id).await.unwrap_err()));
    assert!(is_forbidden(&fx.engine.queues().position(other, ticket.id).await.unwrap_err()));

    let stored = fx.engine.storage().get_ticket(ticket.id).await.unwrap();
    assert_eq!(stored.current_state, "received");
    assert_eq!(stored.version, 0);
}

#[tokio::test]
async fn missing_ticket_is_not_found_rather_than_forbidden() {
    let fx = Fixture::new().await;
    let err = fx
        .engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticketflow_core::TicketId::new(), "start", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { kind: "ticket", .. }));
}

#[tokio::test]
async fn cannot_create_in_or_forward_to_a_foreign_queue() {
    let fx = Fixture::new().await;
    let (_, other_queue, _) = fx.other_tenant().await;

    let err = fx
        .engine
        .lifecycle()
        .create_ticket(fx.tenant, NewTicket::new(other_queue, fx.repair, json!({ "customer": "Ada" })))
        .await
        .unwrap_err();
    assert!(is_forbidden(&err), "{err}");

    let ticket = fx.create("Ada").await;
    let err = fx
        .engine
        .lifecycle()
        .forward_ticket(fx.tenant, ticket.id, other_queue, None, None)
        .await
        .unwrap_err();
    assert!(is_forbidden(&err), "{err}");
    assert_eq!(fx.queue_order(fx.queue).await, vec![ticket.id]);
}

#[tokio::test]
async fn foreign_employee_cannot_be_assigned_or_act() {
    let fx = Fixture::new().await;
    let (other, _, _) = fx.other_tenant().await;
    let outsider = fx
        .engine
        .directory()
        .create_employee(other, "Mallory")
        .await
        .unwrap();
    let ticket = fx.create("Ada").await;

    let err = fx
        .engine
        .lifecycle()
        .assign_employee(fx.tenant, ticket.id, outsider.id)
        .await
        .unwrap_err();
    assert!(is_forbidden(&err), "{err}");
    let err = fx
        .engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticket.id, "start", Some(outsider.id))
        .await
        .unwrap_err();
    assert!(is_forbidden(&err), "{err}");
}

#[tokio::test]
async fn foreign_queue_listing_is_forbidden() {
    let fx = Fixture::new().await;
    let (other, _, _) = fx.other_tenant().await;
    fx.create("Ada").await;

    let queues = fx.engine.queues();
    assert!(is_forbidden(
        &queues.list(other, fx.queue, &QueueQuery::default()).await.unwrap_err()
    ));
    assert!(is_forbidden(&queues.count(other, fx.queue, None).await.unwrap_err()));
    assert!(is_forbidden(
        &fx.engine.directory().get_queue(other, fx.queue).await.unwrap_err()
    ));
}

#[tokio::test]
async fn definitions_are_private_to_their_tenant() {
    let fx = Fixture::new().await;
    let (other, _, other_repair) = fx.other_tenant().await;
    let registry = fx.engine.registry();

    let err = registry.get(other, fx.repair).await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { .. }), "{err}");
    let visible: Vec<_> = registry
        .list(fx.tenant)
        .await
        .unwrap()
        .iter()
        .map(|d| d.id())
        .collect();
    assert_eq!(visible, vec![fx.repair]);
    assert!(!visible.contains(&other_repair));

    // Queues may only accept types their tenant can see.
    let err = fx
        .engine
        .directory()
        .create_queue(fx.tenant, "sneaky", vec![other_repair])
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { .. }), "{err}");

    let err = registry
        .update(DefinitionScope::Tenant(other), fx.repair, repair_document())
        .await
        .unwrap_err();
    assert!(is_forbidden(&err), "{err}");
}

#[tokio::test]
async fn system_definitions_are_shared() {
    let fx = Fixture::new().await;
    let (other, _, _) = fx.other_tenant().await;
    let registry = fx.engine.registry();
    let mut document: TypeDefinitionDocument = repair_document();
    document.type_code = "walk_in".into();
    let shared = registry
        .register(DefinitionScope::System, document.clone())
        .await
        .unwrap()
        .id();

    for tenant in [fx.tenant, other] {
        assert_eq!(registry.get(tenant, shared).await.unwrap().id(), shared);
        let queue = fx
            .engine
            .directory()
            .create_queue(tenant, "walk-ins", vec![shared])
            .await
            .unwrap();
        let ticket = fx
            .engine
            .lifecycle()
            .create_ticket(tenant, NewTicket::new(queue.id, shared, json!({ "customer": "Ada" })))
            .await
            .unwrap();
        assert_eq!(ticket.tenant_id, tenant);
    }

    let err = registry
        .update(DefinitionScope::Tenant(fx.tenant), shared, document)
        .await
        .unwrap_err();
    assert!(is_forbidden(&err), "{err}");
}
