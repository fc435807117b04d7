use std::future::Future;
use std::sync::Arc;

use super::{make_ticket, seed_tenant_and_queue, seed_ticket, CheckResult};
use crate::{StorageError, TicketStorage};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "concurrent",
            "concurrent_ticket_updates_exactly_one_wins",
            concurrent_ticket_updates_exactly_one_wins(factory).await,
        ),
        CheckResult::new(
            "concurrent",
            "concurrent_enqueues_all_land",
            concurrent_enqueues_all_land(factory).await,
        ),
    ]
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks each open a snapshot and attempt to update the same ticket from
/// version 0. Exactly one commit succeeds; the rest get ConcurrentConflict,
/// either when staging or when committing.
async fn concurrent_ticket_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let (tenant_id, queue_id) = seed_tenant_and_queue(storage.as_ref()).await?;
    let id = seed_ticket(storage.as_ref(), tenant_id, queue_id).await?;
    let base = storage
        .get_ticket(id)
        .await
        .map_err(|e| format!("get: {e}"))?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let mut record = base.clone();
        record.current_state = format!("state-{i}");
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s.update_ticket(&mut snap, record, 0).await {
                Ok(_) => {}
                Err(StorageError::ConcurrentConflict { .. }) => {
                    s.abort_snapshot(snap).await?;
                    return Ok(false);
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    return Err(e);
                }
            }
            match s.commit_snapshot(snap).await {
                Ok(()) => Ok(true),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }

    let stored = storage
        .get_ticket(id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if stored.version != 1 {
        return Err(format!(
            "expected version 1 after single winning update, got {}",
            stored.version
        ));
    }
    Ok(())
}

// ── Concurrent enqueue: no lost placements ──────────────────────────────────

/// N tasks each create a ticket and push it onto the same queue. Every
/// placement lands exactly once.
async fn concurrent_enqueues_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let (tenant_id, queue_id) = seed_tenant_and_queue(storage.as_ref()).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let ticket = make_ticket(tenant_id, queue_id, "received");
        handles.push(tokio::spawn(async move {
            let id = ticket.id;
            let mut snap = s.begin_snapshot().await?;
            s.insert_ticket(&mut snap, ticket).await?;
            s.queue_push_back(&mut snap, queue_id, id).await?;
            s.commit_snapshot(snap).await?;
            Ok::<_, StorageError>(id)
        }));
    }

    let mut created = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        created.push(
            handle
                .await
                .map_err(|e| format!("task {i} panic: {e}"))?
                .map_err(|e| format!("task {i} failed: {e}"))?,
        );
    }

    let mut members: Vec<_> = storage
        .list_queue_tickets(queue_id)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|t| t.id)
        .collect();
    members.sort();
    created.sort();
    if members != created {
        return Err(format!(
            "expected {} queue members, found {}",
            created.len(),
            members.len()
        ));
    }
    Ok(())
}
