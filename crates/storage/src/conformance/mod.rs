//! Backend-agnostic checks for `TicketStorage` implementations.
//!
//! Every check gets a fresh, empty backend from the caller's factory and
//! reports a [`CheckResult`]. Areas covered: configuration records and
//! ticket insertion, snapshot isolation, atomic commit, version checks on
//! tickets and items, audit record ordering and scoping, queue ordering,
//! racing snapshots, and the error variant returned for each failure.
//!
//! A backend crate wires the whole suite into one test:
//!
//! ```ignore
//! use ticketflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_backend_conforms() {
//!     let report = run_conformance_suite(|| async { open_scratch_db().await }).await;
//!     assert!(report.is_clean(), "{report}");
//! }
//! ```

mod audit;
mod commit;
mod concurrent;
mod error;
mod init;
mod queue;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::OffsetDateTime;

use ticketflow_core::{
    Actor, DefinitionScope, QueueId, TenantId, TicketId, TicketItemId, TransitionRecordId,
    TypeDefinitionId,
};

use crate::record::{
    QueueRecord, TenantRecord, TicketItemRecord, TicketRecord, TransitionRecord,
    TypeDefinitionRecord,
};
use crate::TicketStorage;

/// Outcome of one check, e.g. `commit/partial_failure_applies_nothing`.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub area: &'static str,
    pub check: &'static str,
    /// `None` when the check held.
    pub failure: Option<String>,
}

impl CheckResult {
    fn new(area: &'static str, check: &'static str, outcome: Result<(), String>) -> Self {
        Self {
            area,
            check,
            failure: outcome.err(),
        }
    }

    pub fn held(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConformanceReport {
    pub checks: Vec<CheckResult>,
}

impl ConformanceReport {
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.held())
    }

    pub fn is_clean(&self) -> bool {
        !self.checks.is_empty() && self.failures().next().is_none()
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        writeln!(
            f,
            "{} storage checks, {} held, {} failed",
            self.checks.len(),
            self.checks.len() - failed,
            failed
        )?;
        for c in self.failures() {
            let reason = c.failure.as_deref().unwrap_or_default();
            writeln!(f, "  {}/{}: {}", c.area, c.check, reason)?;
        }
        Ok(())
    }
}

/// Run every check against backends produced by `factory`.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: TicketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut report = ConformanceReport::default();
    report.checks.extend(init::run_init_tests(&factory).await);
    report.checks.extend(error::run_error_tests(&factory).await);
    report.checks.extend(snapshot::run_snapshot_tests(&factory).await);
    report.checks.extend(commit::run_commit_tests(&factory).await);
    report.checks.extend(version::run_version_tests(&factory).await);
    report.checks.extend(audit::run_audit_tests(&factory).await);
    report.checks.extend(queue::run_queue_tests(&factory).await);
    report.checks.extend(concurrent::run_concurrent_tests(&factory).await);
    tracing::debug!(checks = report.checks.len(), "storage conformance finished");
    report
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

const EPOCH: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

fn make_tenant(name: &str) -> TenantRecord {
    TenantRecord {
        id: TenantId::new(),
        seq: 0,
        name: name.to_string(),
        active: true,
        created_at: EPOCH,
    }
}

fn make_queue(tenant_id: TenantId, name: &str) -> QueueRecord {
    QueueRecord {
        id: QueueId::new(),
        seq: 0,
        tenant_id,
        name: name.to_string(),
        accepted_type_ids: Vec::new(),
        active: true,
        created_at: EPOCH,
        updated_at: EPOCH,
    }
}

fn make_definition(scope: DefinitionScope, type_code: &str) -> TypeDefinitionRecord {
    TypeDefinitionRecord {
        id: TypeDefinitionId::new(),
        seq: 0,
        scope,
        type_code: type_code.to_string(),
        document: serde_json::json!({ "typeCode": type_code, "typeName": type_code }),
        version: 0,
        active: true,
        created_at: EPOCH,
        updated_at: EPOCH,
    }
}

fn make_ticket(tenant_id: TenantId, queue_id: QueueId, state: &str) -> TicketRecord {
    TicketRecord {
        id: TicketId::new(),
        seq: 0,
        version: 0,
        tenant_id,
        queue_id,
        previous_queue_id: None,
        type_definition_id: TypeDefinitionId::new(),
        current_state: state.to_string(),
        person_id: None,
        parent_ticket_id: None,
        assigned_employee_id: None,
        payload: serde_json::json!({}),
        ttl_minutes: None,
        expires_at: None,
        created_at: EPOCH,
        updated_at: EPOCH,
        state_entered_at: EPOCH,
        ready_at: None,
        completed_at: None,
        cancelled_at: None,
    }
}

fn make_item(ticket_id: TicketId, state: Option<&str>) -> TicketItemRecord {
    TicketItemRecord {
        id: TicketItemId::new(),
        seq: 0,
        version: 0,
        ticket_id,
        type_definition_id: TypeDefinitionId::new(),
        current_state: state.map(str::to_string),
        payload: serde_json::json!({}),
        created_at: EPOCH,
        updated_at: EPOCH,
        state_entered_at: state.map(|_| EPOCH),
    }
}

fn make_transition(
    ticket_id: TicketId,
    transition_name: Option<&str>,
    previous_state: Option<&str>,
    new_state: &str,
) -> TransitionRecord {
    TransitionRecord {
        id: TransitionRecordId::new(),
        seq: 0,
        ticket_id,
        item_id: None,
        transition_name: transition_name.map(str::to_string),
        previous_state: previous_state.map(str::to_string),
        new_state: new_state.to_string(),
        actor: Actor::System,
        notes: None,
        recorded_at: EPOCH,
    }
}

/// Commit a tenant and one queue; most tests start here.
async fn seed_tenant_and_queue<S: TicketStorage>(
    storage: &S,
) -> Result<(TenantId, QueueId), String> {
    let tenant = make_tenant("acme");
    let queue = make_queue(tenant.id, "front desk");
    let ids = (tenant.id, queue.id);
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .put_tenant(&mut snap, tenant)
        .await
        .map_err(|e| format!("put_tenant: {e}"))?;
    storage
        .put_queue(&mut snap, queue)
        .await
        .map_err(|e| format!("put_queue: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))?;
    Ok(ids)
}

/// Commit a ticket placed at the tail of `queue_id`, with its initial record.
async fn seed_ticket<S: TicketStorage>(
    storage: &S,
    tenant_id: TenantId,
    queue_id: QueueId,
) -> Result<TicketId, String> {
    let ticket = make_ticket(tenant_id, queue_id, "received");
    let id = ticket.id;
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_ticket(&mut snap, ticket)
        .await
        .map_err(|e| format!("insert_ticket: {e}"))?;
    storage
        .queue_push_back(&mut snap, queue_id, id)
        .await
        .map_err(|e| format!("queue_push_back: {e}"))?;
    storage
        .append_transition(&mut snap, make_transition(id, None, None, "received"))
        .await
        .map_err(|e| format!("append_transition: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit ticket: {e}"))?;
    Ok(id)
}
