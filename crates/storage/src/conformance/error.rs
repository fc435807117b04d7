use std::future::Future;

use ticketflow_core::{
    EmployeeId, QueueId, TenantId, TicketId, TicketItemId, TypeDefinitionId,
};

use super::{make_ticket, make_transition, seed_tenant_and_queue, seed_ticket, CheckResult};
use crate::{StorageError, TicketStorage};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "error",
            "get_missing_records_not_found",
            get_missing_records_not_found(factory).await,
        ),
        CheckResult::new(
            "error",
            "update_missing_ticket_not_found",
            update_missing_ticket_not_found(factory).await,
        ),
        CheckResult::new(
            "error",
            "append_transition_for_missing_ticket_not_found",
            append_transition_for_missing_ticket_not_found(factory).await,
        ),
        CheckResult::new(
            "error",
            "queue_remove_non_member_not_found",
            queue_remove_non_member_not_found(factory).await,
        ),
        CheckResult::new(
            "error",
            "list_queue_tickets_unknown_queue_not_found",
            list_queue_tickets_unknown_queue_not_found(factory).await,
        ),
        CheckResult::new(
            "error",
            "lists_for_unknown_ticket_are_empty",
            lists_for_unknown_ticket_are_empty(factory).await,
        ),
    ]
}

fn expect_not_found<T: std::fmt::Debug>(
    what: &str,
    expected_kind: &str,
    result: Result<T, StorageError>,
) -> Result<(), String> {
    match result {
        Err(StorageError::NotFound { kind, .. }) if kind == expected_kind => Ok(()),
        other => Err(format!(
            "{what}: expected NotFound({expected_kind}), got {other:?}"
        )),
    }
}

async fn get_missing_records_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    expect_not_found(
        "get_tenant",
        "tenant",
        storage.get_tenant(TenantId::new()).await,
    )?;
    expect_not_found("get_queue", "queue", storage.get_queue(QueueId::new()).await)?;
    expect_not_found(
        "get_employee",
        "employee",
        storage.get_employee(EmployeeId::new()).await,
    )?;
    expect_not_found(
        "get_type_definition",
        "type definition",
        storage.get_type_definition(TypeDefinitionId::new()).await,
    )?;
    expect_not_found(
        "get_ticket",
        "ticket",
        storage.get_ticket(TicketId::new()).await,
    )?;
    expect_not_found(
        "get_item",
        "ticket item",
        storage.get_item(TicketItemId::new()).await,
    )
}

async fn update_missing_ticket_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = storage
        .update_ticket(&mut snap, make_ticket(tenant_id, queue_id, "received"), 0)
        .await;
    let _ = storage.abort_snapshot(snap).await;
    expect_not_found("update_ticket", "ticket", result)
}

async fn append_transition_for_missing_ticket_not_found<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = storage
        .append_transition(
            &mut snap,
            make_transition(TicketId::new(), None, None, "received"),
        )
        .await;
    let _ = storage.abort_snapshot(snap).await;
    expect_not_found("append_transition", "ticket", result)
}

async fn queue_remove_non_member_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (_, queue_id) = seed_tenant_and_queue(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = storage
        .queue_remove(&mut snap, queue_id, TicketId::new())
        .await;
    let _ = storage.abort_snapshot(snap).await;
    expect_not_found("queue_remove", "queue membership", result)
}

async fn list_queue_tickets_unknown_queue_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    expect_not_found(
        "list_queue_tickets",
        "queue",
        storage.list_queue_tickets(QueueId::new()).await,
    )
}

async fn lists_for_unknown_ticket_are_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    // A real ticket exists so empty results are not an empty backend.
    seed_ticket(&storage, tenant_id, queue_id).await?;

    let unknown = TicketId::new();
    let transitions = storage
        .list_transitions(unknown)
        .await
        .map_err(|e| e.to_string())?;
    let items = storage.list_items(unknown).await.map_err(|e| e.to_string())?;
    let movements = storage
        .list_movements(unknown)
        .await
        .map_err(|e| e.to_string())?;
    let children = storage
        .list_child_tickets(unknown)
        .await
        .map_err(|e| e.to_string())?;
    if transitions.is_empty() && items.is_empty() && movements.is_empty() && children.is_empty() {
        Ok(())
    } else {
        Err("expected empty lists for an unknown ticket".to_string())
    }
}
