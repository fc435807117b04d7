//! Queue ordering conformance tests.

use std::future::Future;

use ticketflow_core::{QueueId, TicketId};

use super::{seed_tenant_and_queue, seed_ticket, CheckResult};
use crate::{StorageError, TicketStorage};

pub(super) async fn run_queue_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "queue",
            "push_back_preserves_arrival_order",
            push_back_preserves_arrival_order(factory).await,
        ),
        CheckResult::new(
            "queue",
            "double_push_rejected",
            double_push_rejected(factory).await,
        ),
        CheckResult::new(
            "queue",
            "remove_closes_gap",
            remove_closes_gap(factory).await,
        ),
        CheckResult::new(
            "queue",
            "reposition_shifts_only_between",
            reposition_shifts_only_between(factory).await,
        ),
        CheckResult::new(
            "queue",
            "reposition_clamps_to_tail",
            reposition_clamps_to_tail(factory).await,
        ),
    ]
}

async fn fill_queue<S: TicketStorage>(
    storage: &S,
    n: usize,
) -> Result<(QueueId, Vec<TicketId>), String> {
    let (tenant_id, queue_id) = seed_tenant_and_queue(storage).await?;
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        ids.push(seed_ticket(storage, tenant_id, queue_id).await?);
    }
    Ok((queue_id, ids))
}

async fn order_of<S: TicketStorage>(
    storage: &S,
    queue_id: QueueId,
) -> Result<Vec<TicketId>, String> {
    Ok(storage
        .list_queue_tickets(queue_id)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|t| t.id)
        .collect())
}

async fn push_back_preserves_arrival_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (queue_id, ids) = fill_queue(&storage, 3).await?;
    let order = order_of(&storage, queue_id).await?;
    if order != ids {
        return Err(format!("expected {ids:?}, got {order:?}"));
    }
    for (expected, id) in ids.iter().enumerate() {
        let position = storage
            .queue_position(queue_id, *id)
            .await
            .map_err(|e| e.to_string())?;
        if position != Some(expected) {
            return Err(format!("{id}: expected position {expected}, got {position:?}"));
        }
    }
    Ok(())
}

async fn double_push_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (queue_id, ids) = fill_queue(&storage, 1).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = storage.queue_push_back(&mut snap, queue_id, ids[0]).await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {other:?}")),
    }
}

async fn remove_closes_gap<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (queue_id, ids) = fill_queue(&storage, 3).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .queue_remove(&mut snap, queue_id, ids[1])
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let order = order_of(&storage, queue_id).await?;
    if order != [ids[0], ids[2]] {
        return Err(format!("unexpected order after remove: {order:?}"));
    }
    Ok(())
}

async fn reposition_shifts_only_between<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (queue_id, ids) = fill_queue(&storage, 5).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .queue_reposition(&mut snap, queue_id, ids[3], 1)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let order = order_of(&storage, queue_id).await?;
    let expected = [ids[0], ids[3], ids[1], ids[2], ids[4]];
    if order != expected {
        return Err(format!("expected {expected:?}, got {order:?}"));
    }
    Ok(())
}

async fn reposition_clamps_to_tail<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (queue_id, ids) = fill_queue(&storage, 3).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .queue_reposition(&mut snap, queue_id, ids[0], 99)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let order = order_of(&storage, queue_id).await?;
    if order != [ids[1], ids[2], ids[0]] {
        return Err(format!("unexpected order after clamp: {order:?}"));
    }
    Ok(())
}
