//! Record creation conformance tests.

use std::future::Future;

use ticketflow_core::DefinitionScope;

use super::{
    make_definition, make_queue, make_tenant, make_ticket, seed_tenant_and_queue, CheckResult,
};
use crate::{StorageError, TicketStorage};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<CheckResult>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        CheckResult::new(
            "init",
            "put_tenant_visible_after_commit",
            put_tenant_visible_after_commit(factory).await,
        ),
        CheckResult::new(
            "init",
            "put_replaces_and_keeps_seq",
            put_replaces_and_keeps_seq(factory).await,
        ),
        CheckResult::new(
            "init",
            "put_queue_requires_tenant",
            put_queue_requires_tenant(factory).await,
        ),
        CheckResult::new(
            "init",
            "insert_ticket_starts_at_version_0",
            insert_ticket_starts_at_version_0(factory).await,
        ),
        CheckResult::new(
            "init",
            "insert_ticket_duplicate_rejected",
            insert_ticket_duplicate_rejected(factory).await,
        ),
        CheckResult::new(
            "init",
            "seq_strictly_increases",
            seq_strictly_increases(factory).await,
        ),
        CheckResult::new(
            "init",
            "type_definitions_listed_per_scope",
            type_definitions_listed_per_scope(factory).await,
        ),
        CheckResult::new(
            "init",
            "duplicate_type_code_in_scope_rejected",
            duplicate_type_code_in_scope_rejected(factory).await,
        ),
    ]
}

async fn put_tenant_visible_after_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let tenant = make_tenant("acme");
    let id = tenant.id;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_tenant(&mut snap, tenant)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let stored = storage.get_tenant(id).await.map_err(|e| e.to_string())?;
    if stored.name != "acme" || !stored.active {
        return Err(format!("unexpected tenant: {stored:?}"));
    }
    if stored.seq <= 0 {
        return Err(format!("expected assigned seq, got {}", stored.seq));
    }
    Ok(())
}

async fn put_replaces_and_keeps_seq<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (_, queue_id) = seed_tenant_and_queue(&storage).await?;
    let before = storage
        .get_queue(queue_id)
        .await
        .map_err(|e| e.to_string())?;

    let mut replaced = before.clone();
    replaced.active = false;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_queue(&mut snap, replaced)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let after = storage
        .get_queue(queue_id)
        .await
        .map_err(|e| e.to_string())?;
    if after.active {
        return Err("queue still active after replace".to_string());
    }
    if after.seq != before.seq {
        return Err(format!("seq changed: {} -> {}", before.seq, after.seq));
    }
    Ok(())
}

async fn put_queue_requires_tenant<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let orphan = make_queue(make_tenant("ghost").id, "orphan");
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = storage.put_queue(&mut snap, orphan).await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::NotFound { kind: "tenant", .. }) => Ok(()),
        other => Err(format!("expected tenant NotFound, got {other:?}")),
    }
}

async fn insert_ticket_starts_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let stored = storage.get_ticket(id).await.map_err(|e| e.to_string())?;
    if stored.version != 0 {
        return Err(format!("expected version 0, got {}", stored.version));
    }
    if stored.current_state != "received" {
        return Err(format!("unexpected state '{}'", stored.current_state));
    }
    Ok(())
}

async fn insert_ticket_duplicate_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let ticket = make_ticket(tenant_id, queue_id, "received");

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .insert_ticket(&mut snap, ticket.clone())
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = storage.insert_ticket(&mut snap, ticket).await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { kind: "ticket", .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {other:?}")),
    }
}

async fn seq_strictly_increases<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, queue_id) = seed_tenant_and_queue(&storage).await?;
    let mut seqs = Vec::new();
    for _ in 0..3 {
        let ticket = make_ticket(tenant_id, queue_id, "received");
        let id = ticket.id;
        let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
        storage
            .insert_ticket(&mut snap, ticket)
            .await
            .map_err(|e| e.to_string())?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| e.to_string())?;
        seqs.push(
            storage
                .get_ticket(id)
                .await
                .map_err(|e| e.to_string())?
                .seq,
        );
    }
    if seqs.windows(2).all(|w| w[0] < w[1]) {
        Ok(())
    } else {
        Err(format!("seq not increasing: {seqs:?}"))
    }
}

async fn type_definitions_listed_per_scope<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, _) = seed_tenant_and_queue(&storage).await?;
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_type_definition(
            &mut snap,
            make_definition(DefinitionScope::Tenant(tenant_id), "repair"),
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    storage
        .put_type_definition(
            &mut snap,
            make_definition(DefinitionScope::System, "generic"),
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    let tenant_defs = storage
        .list_type_definitions(DefinitionScope::Tenant(tenant_id))
        .await
        .map_err(|e| e.to_string())?;
    let system_defs = storage
        .list_type_definitions(DefinitionScope::System)
        .await
        .map_err(|e| e.to_string())?;
    let codes = |defs: &[crate::TypeDefinitionRecord]| {
        defs.iter()
            .map(|d| d.type_code.clone())
            .collect::<Vec<_>>()
    };
    if codes(&tenant_defs) != ["repair"] {
        return Err(format!("tenant scope: {:?}", codes(&tenant_defs)));
    }
    if codes(&system_defs) != ["generic"] {
        return Err(format!("system scope: {:?}", codes(&system_defs)));
    }
    Ok(())
}

async fn duplicate_type_code_in_scope_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let (tenant_id, _) = seed_tenant_and_queue(&storage).await?;
    let scope = DefinitionScope::Tenant(tenant_id);
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_type_definition(&mut snap, make_definition(scope, "repair"), None)
        .await
        .map_err(|e| e.to_string())?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| e.to_string())?;

    // Same code under another scope is fine.
    let mut snap = storage.begin_snapshot().await.map_err(|e| e.to_string())?;
    storage
        .put_type_definition(
            &mut snap,
            make_definition(DefinitionScope::System, "repair"),
            None,
        )
        .await
        .map_err(|e| format!("system scope rejected: {e}"))?;
    let result = storage
        .put_type_definition(&mut snap, make_definition(scope, "repair"), None)
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DuplicateKey { .. }) => Ok(()),
        other => Err(format!("expected DuplicateKey, got {other:?}")),
    }
}
