//! Transient storage failures: bounded retries, no partial writes, nothing
//! leaked to the caller.

mod support;

use ticketflow_core::DefinitionScope;
use ticketflow_engine::{EngineConfig, LifecycleError, RegistryConfig, RetryConfig};
use ticketflow_storage::TicketStorage;

use support::{repair_document, Fixture};

fn fast_retry(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        retry: RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn transient_commit_failures_are_retried() {
    let fx = Fixture::with_config(fast_retry(3)).await;
    let ticket = fx.create("Ada").await;

    fx.engine.storage().fail_next_commits(2);
    let outcome = fx
        .engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticket.id, "start", None)
        .await
        .unwrap();
    assert_eq!(outcome.current_state, "in_progress");

    let history = fx.engine.audit().history(fx.tenant, ticket.id).await.unwrap();
    assert_eq!(history.len(), 2);
    fx.assert_consistent(ticket.id).await;
}

#[tokio::test]
async fn exhausted_retries_surface_as_internal_and_write_nothing() {
    let fx = Fixture::with_config(fast_retry(2)).await;
    let ticket = fx.create("Ada").await;

    fx.engine.storage().fail_next_commits(2);
    let err = fx
        .engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticket.id, "start", None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::Internal {
            operation: "transition_ticket"
        }
    );
    assert!(!err.is_rejection());

    let stored = fx.engine.storage().get_ticket(ticket.id).await.unwrap();
    assert_eq!(stored.current_state, "received");
    assert_eq!(stored.version, 0);
    assert_eq!(fx.engine.audit().history(fx.tenant, ticket.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_create_leaves_no_ticket_behind() {
    let fx = Fixture::with_config(fast_retry(1)).await;
    fx.engine.storage().fail_next_commits(1);

    let err = fx
        .engine
        .lifecycle()
        .create_ticket(fx.tenant, fx.repair_request("Ada"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Internal { .. }));
    assert!(fx.queue_order(fx.queue).await.is_empty());

    // The next attempt goes through normally.
    let ticket = fx.create("Ada").await;
    assert_eq!(fx.queue_order(fx.queue).await, vec![ticket.id]);
}

#[tokio::test]
async fn rule_violations_are_not_retried() {
    let fx = Fixture::with_config(fast_retry(3)).await;
    let ticket = fx.create("Ada").await;

    // A rejection returns before commit, so the injected failures stay armed.
    fx.engine.storage().fail_next_commits(1);
    fx.engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticket.id, "pick_up", None)
        .await
        .unwrap_err();

    let storage = fx.engine.storage();
    let snap = storage.begin_snapshot().await.unwrap();
    assert!(storage.commit_snapshot(snap).await.is_err());
}

#[tokio::test]
async fn uncached_registry_sees_updates_immediately() {
    let config = EngineConfig {
        registry: RegistryConfig {
            cache_enabled: false,
        },
        ..EngineConfig::default()
    };
    let fx = Fixture::with_config(config).await;
    let ticket = fx.create("Ada").await;

    let mut document = repair_document();
    if let Some(machine) = document.state_machine.as_mut() {
        machine.states.push("on_hold".into());
        machine.transitions.push(ticketflow_core::TransitionDocument {
            name: "hold".into(),
            from: "received".into(),
            to: "on_hold".into(),
        });
    }
    fx.engine
        .registry()
        .update(DefinitionScope::Tenant(fx.tenant), fx.repair, document)
        .await
        .unwrap();

    let outcome = fx
        .engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticket.id, "hold", None)
        .await
        .unwrap();
    assert_eq!(outcome.current_state, "on_hold");
    fx.assert_consistent(ticket.id).await;
}

#[tokio::test]
async fn cached_definition_is_stale_until_invalidated() {
    let fx = Fixture::new().await;
    let ticket = fx.create("Ada").await;

    // Another writer changes the stored definition behind the registry's back.
    let storage = fx.engine.storage();
    let mut record = storage.get_type_definition(fx.repair).await.unwrap();
    let mut document = repair_document();
    if let Some(machine) = document.state_machine.as_mut() {
        machine.states.push("on_hold".into());
        machine.transitions.push(ticketflow_core::TransitionDocument {
            name: "hold".into(),
            from: "received".into(),
            to: "on_hold".into(),
        });
    }
    record.document = serde_json::to_value(&document).unwrap();
    let expected = record.version;
    let mut snap = storage.begin_snapshot().await.unwrap();
    storage
        .put_type_definition(&mut snap, record, Some(expected))
        .await
        .unwrap();
    storage.commit_snapshot(snap).await.unwrap();

    let stale = fx
        .engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticket.id, "hold", None)
        .await
        .unwrap_err();
    assert!(matches!(stale, LifecycleError::UnknownTransition { .. }), "{stale:?}");

    fx.engine.registry().invalidate(fx.repair);
    let outcome = fx
        .engine
        .lifecycle()
        .transition_ticket(fx.tenant, ticket.id, "hold", None)
        .await
        .unwrap();
    assert_eq!(outcome.current_state, "on_hold");
}
