//! Version validation / OCC conformance tests.

use std::future::Future;

use ticketflow_core::DefinitionScope;

use super::{make_definition, make_item, seed_tenant_and_queue, seed_ticket, CheckResult};
use crate::{StorageError, TicketStorage};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "version",
            "update_increments_version",
            update_increments_version(factory).await,
        ),
        CheckResult::new(
            "version",
            "stale_update_conflicts",
            stale_update_conflicts(factory).await,
        ),
        CheckResult::new(
            "version",
            "chained_updates_in_one_snapshot",
            chained_updates_in_one_snapshot(factory).await,
        ),
        CheckResult::new(
            "version",
            "item_update_versioned",
            item_update_versioned(factory).await,
        ),
        CheckResult::new(
            "version",
            "type_definition_update_versioned",
            type_definition_update_versioned(factory).await,
        ),
    ]
}

async fn update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let id = seed_ticket(&storage, tenant_id, queue_id).await?;

    for expected in 0..3 {
        let ticket = storage.get_ticket(id).await.map_err(|e| e.to_string())?;
        let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
        let returned = storage
            .update_ticket(&mut snap, ticket, expected)
            .await
            .map_err(|e| e.to_string())?;
        if returned != expected + 1 {
            return Err(format!("update returned {returned}, expected {}", expected + 1));
        }
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| e.to_string())?;
    }
    let stored = storage.get_ticket(id).await.map_err(|e| e.to_string())?;
    if stored.version != 3 {
        return Err(format!("expected version 3, got {}", stored.version));
    }
    Ok(())
}

async fn stale_update_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let id = seed_ticket(&storage, tenant_id, queue_id).await?;
    let ticket = storage.get_ticket(id).await.map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .update_ticket(&mut snap, ticket.clone(), 0)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = storage.update_ticket(&mut snap, ticket, 0).await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            expected_version: 0,
            ..
        }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict at 0, got {other:?}")),
    }
}

async fn chained_updates_in_one_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let id = seed_ticket(&storage, tenant_id, queue_id).await?;
    let ticket = storage.get_ticket(id).await.map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let v1 = storage
        .update_ticket(&mut snap, ticket.clone(), 0)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .update_ticket(&mut snap, ticket, v1)
        .await
        .map_err(|e| format!("second update at staged version: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let stored = storage.get_ticket(id).await.map_err(|e| e.to_string())?;
    if stored.version != 2 {
        return Err(format!("expected version 2, got {}", stored.version));
    }
    Ok(())
}

async fn item_update_versioned<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let ticket_id = seed_ticket(&storage, tenant_id, queue_id).await?;
    let item = make_item(ticket_id, Some("pending"));
    let item_id = item.id;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_item(&mut snap, item.clone())
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut packed = item;
    packed.current_state = Some("packed".to_string());
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .update_item(&mut snap, packed.clone(), 0)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let stale = storage.update_item(&mut snap, packed, 0).await;
    let _ = storage.abort_snapshot(snap).await;
    if !matches!(stale, Err(StorageError::ConcurrentConflict { .. })) {
        return Err(format!("expected stale item update to conflict, got {stale:?}"));
    }

    let stored = storage.get_item(item_id).await.map_err(|e| e.to_string())?;
    if stored.version != 1 || stored.current_state.as_deref() != Some("packed") {
        return Err(format!("unexpected item after update: {stored:?}"));
    }
    Ok(())
}

async fn type_definition_update_versioned<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let record = make_definition(DefinitionScope::System, "generic");
    let id = record.id;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_type_definition(&mut snap, record.clone(), None)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_type_definition(&mut snap, record.clone(), Some(0))
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let stored = storage
        .get_type_definition(id)
        .await
        .map_err(|e| e.to_string())?;
    if stored.version != 1 {
        return Err(format!("expected definition version 1, got {}", stored.version));
    }

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let stale = storage
        .put_type_definition(&mut snap, record.clone(), Some(0))
        .await;
    let insert_again = storage.put_type_definition(&mut snap, record, None).await;
    let _ = storage.abort_snapshot(snap).await;
    match (stale, insert_again) {
        (
            Err(StorageError::ConcurrentConflict { .. }),
            Err(StorageError::AlreadyExists { .. }),
        ) => Ok(()),
        other => Err(format!("expected conflict and AlreadyExists, got {other:?}")),
    }
}
