//! Audit record conformance tests.
//!
//! Transition and movement records are append-only, returned in commit
//! order, and scoped to the ticket (or item) they document.

use std::future::Future;

use ticketflow_core::{Actor, MovementRecordId};

use super::{
    make_item, make_queue, make_transition, seed_tenant_and_queue, seed_ticket, CheckResult, EPOCH,
};
use crate::{MovementKind, MovementRecord, TicketStorage};

pub(super) async fn run_audit_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "audit",
            "transitions_returned_in_commit_order",
            transitions_returned_in_commit_order(factory).await,
        ),
        CheckResult::new(
            "audit",
            "item_transitions_kept_apart_from_ticket_history",
            item_transitions_kept_apart_from_ticket_history(factory).await,
        ),
        CheckResult::new(
            "audit",
            "movements_recorded_per_ticket",
            movements_recorded_per_ticket(factory).await,
        ),
    ]
}

async fn transitions_returned_in_commit_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let id = seed_ticket(&storage, tenant_id, queue_id).await?;
    let other = seed_ticket(&storage, tenant_id, queue_id).await?;

    for (name, from, to) in [
        ("start", "received", "in_progress"),
        ("finish", "in_progress", "done"),
    ] {
        let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
        storage
            .append_transition(&mut snap, make_transition(id, Some(name), Some(from), to))
            .await
            .map_err(|e| e.to_string())?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| e.to_string())?;
    }

    let history = storage
        .list_transitions(id)
        .await
        .map_err(|e| e.to_string())?;
    let states: Vec<_> = history.iter().map(|r| r.new_state.as_str()).collect();
    if states != ["received", "in_progress", "done"] {
        return Err(format!("unexpected history: {states:?}"));
    }
    if !history.windows(2).all(|w| w[0].seq < w[1].seq) {
        return Err("history seq not increasing".to_string());
    }
    let other_history = storage
        .list_transitions(other)
        .await
        .map_err(|e| e.to_string())?;
    if other_history.len() != 1 {
        return Err(format!(
            "records leaked across tickets: {}",
            other_history.len()
        ));
    }
    Ok(())
}

async fn item_transitions_kept_apart_from_ticket_history<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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

    let mut record = make_transition(ticket_id, None, None, "pending");
    record.item_id = Some(item_id);
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_item(&mut snap, item)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .append_transition(&mut snap, record)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let ticket_history = storage
        .list_transitions(ticket_id)
        .await
        .map_err(|e| e.to_string())?;
    let item_history = storage
        .list_item_transitions(item_id)
        .await
        .map_err(|e| e.to_string())?;
    if ticket_history.len() != 1 || item_history.len() != 1 {
        return Err(format!(
            "expected 1 ticket and 1 item record, got {} and {}",
            ticket_history.len(),
            item_history.len()
        ));
    }
    if item_history[0].new_state != "pending" {
        return Err(format!("unexpected item record: {:?}", item_history[0]));
    }
    Ok(())
}

async fn movements_recorded_per_ticket<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let id = seed_ticket(&storage, tenant_id, queue_id).await?;
    let target = make_queue(tenant_id, "workshop");
    let target_id = target.id;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_queue(&mut snap, target)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .append_movement(
            &mut snap,
            MovementRecord {
                id: MovementRecordId::new(),
                seq: 0,
                ticket_id: id,
                kind: MovementKind::Forwarded {
                    from_queue: queue_id,
                    to_queue: target_id,
                },
                actor: Actor::System,
                reason: Some("escalated".to_string()),
                recorded_at: EPOCH,
            },
        )
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let movements = storage
        .list_movements(id)
        .await
        .map_err(|e| e.to_string())?;
    match movements.as_slice() {
        [m] if m.kind
            == (MovementKind::Forwarded {
                from_queue: queue_id,
                to_queue: target_id,
            }) =>
        {
            Ok(())
        }
        other => Err(format!("unexpected movements: {other:?}")),
    }
}
