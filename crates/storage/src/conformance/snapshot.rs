//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted or dropped writes are discarded.

use std::future::Future;

use super::{make_ticket, seed_tenant_and_queue, seed_ticket, CheckResult};
use crate::{StorageError, TicketStorage};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "snapshot",
            "uncommitted_ticket_invisible_until_commit",
            uncommitted_ticket_invisible_until_commit(factory).await,
        ),
        CheckResult::new(
            "snapshot",
            "uncommitted_update_invisible",
            uncommitted_update_invisible(factory).await,
        ),
        CheckResult::new(
            "snapshot",
            "uncommitted_queue_membership_invisible",
            uncommitted_queue_membership_invisible(factory).await,
        ),
        CheckResult::new(
            "snapshot",
            "abort_discards_writes",
            abort_discards_writes(factory).await,
        ),
        CheckResult::new(
            "snapshot",
            "drop_discards_writes",
            drop_discards_writes(factory).await,
        ),
    ]
}

async fn uncommitted_ticket_invisible_until_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let ticket = make_ticket(tenant_id, queue_id, "received");
    let id = ticket.id;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_ticket(&mut snap, ticket)
        .await
        .map_err(|e| e.to_string())?;
    match storage.get_ticket(id).await {
        Err(StorageError::NotFound { .. }) => {}
        other => return Err(format!("uncommitted ticket visible: {other:?}")),
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .get_ticket(id)
        .await
        .map(|_| ())
        .map_err(|e| format!("committed ticket invisible: {e}"))
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let id = seed_ticket(&storage, tenant_id, queue_id).await?;

    let mut updated = storage.get_ticket(id).await.map_err(|e| e.to_string())?;
    updated.current_state = "in_progress".to_string();
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .update_ticket(&mut snap, updated, 0)
        .await
        .map_err(|e| e.to_string())?;

    let seen = storage.get_ticket(id).await.map_err(|e| e.to_string())?;
    let _ = storage.abort_snapshot(snap).await;
    if seen.current_state != "received" || seen.version != 0 {
        return Err(format!(
            "uncommitted update visible: state={} version={}",
            seen.current_state, seen.version
        ));
    }
    Ok(())
}

async fn uncommitted_queue_membership_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let ticket = make_ticket(tenant_id, queue_id, "received");
    let id = ticket.id;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_ticket(&mut snap, ticket)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .queue_push_back(&mut snap, queue_id, id)
        .await
        .map_err(|e| e.to_string())?;

    let members = storage
        .list_queue_tickets(queue_id)
        .await
        .map_err(|e| e.to_string())?;
    let position = storage
        .queue_position(queue_id, id)
        .await
        .map_err(|e| e.to_string())?;
    let _ = storage.abort_snapshot(snap).await;
    if !members.is_empty() || position.is_some() {
        return Err("uncommitted queue membership visible".to_string());
    }
    Ok(())
}

async fn abort_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let ticket = make_ticket(tenant_id, queue_id, "received");
    let id = ticket.id;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_ticket(&mut snap, ticket)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    match storage.get_ticket(id).await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("aborted ticket visible: {other:?}")),
    }
}

async fn drop_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let ticket = make_ticket(tenant_id, queue_id, "received");
    let id = ticket.id;

    {
        let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
        storage
            .insert_ticket(&mut snap, ticket)
            .await
            .map_err(|e| e.to_string())?;
    }

    match storage.get_ticket(id).await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        other => Err(format!("dropped ticket visible: {other:?}")),
    }
}
