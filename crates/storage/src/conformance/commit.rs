//! Atomic commit conformance tests.
//!
//! A snapshot that stages a ticket, its queue placement, and its initial
//! transition record must land completely or not at all.

use std::future::Future;

use super::{make_ticket, make_transition, seed_tenant_and_queue, seed_ticket, CheckResult};
use crate::{StorageError, TicketStorage};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "commit",
            "multi_record_commit_all_visible",
            multi_record_commit_all_visible(factory).await,
        ),
        CheckResult::new(
            "commit",
            "failed_commit_applies_nothing",
            failed_commit_applies_nothing(factory).await,
        ),
        CheckResult::new(
            "commit",
            "staged_ticket_usable_within_snapshot",
            staged_ticket_usable_within_snapshot(factory).await,
        ),
    ]
}

async fn multi_record_commit_all_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let id = seed_ticket(&storage, tenant_id, queue_id).await?;

    storage.get_ticket(id).await.map_err(|e| e.to_string())?;
    let position = storage
        .queue_position(queue_id, id)
        .await
        .map_err(|e| e.to_string())?;
    if position != Some(0) {
        return Err(format!("expected queue position 0, got {position:?}"));
    }
    let history = storage
        .list_transitions(id)
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != 1 {
        return Err(format!("expected 1 transition record, got {}", history.len()));
    }
    Ok(())
}

/// Stage a valid ticket, then have a second snapshot invalidate one of its
/// writes before commit. The whole first snapshot must be rejected.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let existing = seed_ticket(&storage, tenant_id, queue_id).await?;

    let fresh = make_ticket(tenant_id, queue_id, "received");
    let fresh_id = fresh.id;
    let mut first = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_ticket(&mut first, fresh)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .queue_push_back(&mut first, queue_id, fresh_id)
        .await
        .map_err(|e| e.to_string())?;
    let mut bumped = storage
        .get_ticket(existing)
        .await
        .map_err(|e| e.to_string())?;
    bumped.current_state = "in_progress".to_string();
    storage
        .update_ticket(&mut first, bumped.clone(), 0)
        .await
        .map_err(|e| e.to_string())?;

    // A competing snapshot wins the update on `existing`.
    let mut second = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .update_ticket(&mut second, bumped, 0)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(second)
        .await
        .map_err(|e| e.to_string())?;

    match storage.commit_snapshot(first).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
    match storage.get_ticket(fresh_id).await {
        Err(StorageError::NotFound { .. }) => {}
        other => return Err(format!("partial commit: fresh ticket visible: {other:?}")),
    }
    let position = storage
        .queue_position(queue_id, fresh_id)
        .await
        .map_err(|e| e.to_string())?;
    if position.is_some() {
        return Err("partial commit: queue membership applied".to_string());
    }
    Ok(())
}

/// Records staged earlier in a snapshot satisfy references staged later.
async fn staged_ticket_usable_within_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .insert_ticket(&mut snap, ticket.clone())
        .await
        .map_err(|e| e.to_string())?;
    storage
        .append_transition(&mut snap, make_transition(id, None, None, "received"))
        .await
        .map_err(|e| format!("append after staged insert: {e}"))?;
    let mut moved = ticket;
    moved.current_state = "in_progress".to_string();
    let new_version = storage
        .update_ticket(&mut snap, moved, 0)
        .await
        .map_err(|e| format!("update after staged insert: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let stored = storage.get_ticket(id).await.map_err(|e| e.to_string())?;
    if stored.version != new_version || stored.current_state != "in_progress" {
        return Err(format!(
            "expected version {new_version} in_progress, got {} {}",
            stored.version, stored.current_state
        ));
    }
    Ok(())
}
