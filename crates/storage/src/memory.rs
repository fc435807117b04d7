//! In-memory implementation of [`TicketStorage`].
//!
//! Committed state lives in plain maps behind one `tokio::sync::RwLock`.
//! A [`MemorySnapshot`] is a list of staged writes; nothing touches the
//! committed maps until [`TicketStorage::commit_snapshot`].
//!
//! Every staged write is checked immediately (so callers fail fast), and the
//! whole snapshot is checked again under the write lock at commit, because
//! another snapshot may have committed in between. The check is a dry run
//! that also computes the final queue orderings; applying the result cannot
//! fail, so a commit is all-or-nothing. There is no await point between the
//! commit-time check and the apply.
//!
//! Not durable: all state is lost when the value is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use ticketflow_core::{
    DefinitionScope, EmployeeId, QueueId, TenantId, TicketId, TicketItemId, TypeDefinitionId,
};

use crate::error::StorageError;
use crate::record::{
    EmployeeRecord, MovementRecord, QueueRecord, TenantRecord, TicketItemRecord, TicketRecord,
    TransitionRecord, TypeDefinitionRecord,
};
use crate::traits::TicketStorage;

// ── Staged writes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum StagedWrite {
    PutTenant(TenantRecord),
    PutQueue(QueueRecord),
    PutEmployee(EmployeeRecord),
    PutTypeDefinition {
        record: TypeDefinitionRecord,
        expected_version: Option<i64>,
    },
    InsertTicket(TicketRecord),
    UpdateTicket {
        record: TicketRecord,
        expected_version: i64,
    },
    InsertItem(TicketItemRecord),
    UpdateItem {
        record: TicketItemRecord,
        expected_version: i64,
    },
    AppendTransition(TransitionRecord),
    AppendMovement(MovementRecord),
    QueuePushBack {
        queue_id: QueueId,
        ticket_id: TicketId,
    },
    QueueRemove {
        queue_id: QueueId,
        ticket_id: TicketId,
    },
    QueueReposition {
        queue_id: QueueId,
        ticket_id: TicketId,
        position: usize,
    },
}

/// An in-progress transaction against [`MemoryStorage`].
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    writes: Vec<StagedWrite>,
}

impl MemorySnapshot {
    /// Number of writes staged so far.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

// ── Committed state ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tables {
    next_seq: i64,
    tenants: HashMap<TenantId, TenantRecord>,
    queues: HashMap<QueueId, QueueRecord>,
    employees: HashMap<EmployeeId, EmployeeRecord>,
    definitions: HashMap<TypeDefinitionId, TypeDefinitionRecord>,
    tickets: HashMap<TicketId, TicketRecord>,
    items: HashMap<TicketItemId, TicketItemRecord>,
    /// Append order is seq order.
    transitions: Vec<TransitionRecord>,
    movements: Vec<MovementRecord>,
    queue_members: HashMap<QueueId, Vec<TicketId>>,
}

impl Tables {
    fn allocate_seq(&mut self) -> i64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Outcome of a successful dry run over a snapshot's writes.
#[derive(Default)]
struct Plan {
    tenants: HashSet<TenantId>,
    queues: HashSet<QueueId>,
    tickets: HashMap<TicketId, i64>,
    items: HashMap<TicketItemId, i64>,
    definitions: HashMap<TypeDefinitionId, i64>,
    definition_codes: HashMap<(DefinitionScope, String), TypeDefinitionId>,
    /// Final order of every queue the snapshot touches.
    queue_orders: HashMap<QueueId, Vec<TicketId>>,
}

impl Plan {
    fn tenant_exists(&self, tables: &Tables, id: TenantId) -> bool {
        self.tenants.contains(&id) || tables.tenants.contains_key(&id)
    }

    fn ticket_version(&self, tables: &Tables, id: TicketId) -> Option<i64> {
        self.tickets
            .get(&id)
            .copied()
            .or_else(|| tables.tickets.get(&id).map(|t| t.version))
    }

    fn item_version(&self, tables: &Tables, id: TicketItemId) -> Option<i64> {
        self.items
            .get(&id)
            .copied()
            .or_else(|| tables.items.get(&id).map(|i| i.version))
    }

    fn queue_order<'p>(
        &'p mut self,
        tables: &Tables,
        queue_id: QueueId,
    ) -> Result<&'p mut Vec<TicketId>, StorageError> {
        if !self.queues.contains(&queue_id) && !tables.queues.contains_key(&queue_id) {
            return Err(StorageError::not_found("queue", queue_id));
        }
        Ok(self.queue_orders.entry(queue_id).or_insert_with(|| {
            tables
                .queue_members
                .get(&queue_id)
                .cloned()
                .unwrap_or_default()
        }))
    }

    fn check(&mut self, tables: &Tables, write: &StagedWrite) -> Result<(), StorageError> {
        match write {
            StagedWrite::PutTenant(record) => {
                self.tenants.insert(record.id);
            }
            StagedWrite::PutQueue(record) => {
                if !self.tenant_exists(tables, record.tenant_id) {
                    return Err(StorageError::not_found("tenant", record.tenant_id));
                }
                self.queues.insert(record.id);
            }
            StagedWrite::PutEmployee(record) => {
                if !self.tenant_exists(tables, record.tenant_id) {
                    return Err(StorageError::not_found("tenant", record.tenant_id));
                }
            }
            StagedWrite::PutTypeDefinition {
                record,
                expected_version,
            } => {
                if let DefinitionScope::Tenant(tenant) = record.scope {
                    if !self.tenant_exists(tables, tenant) {
                        return Err(StorageError::not_found("tenant", tenant));
                    }
                }
                let current = self
                    .definitions
                    .get(&record.id)
                    .copied()
                    .or_else(|| tables.definitions.get(&record.id).map(|d| d.version));
                match (expected_version, current) {
                    (None, None) => {}
                    (None, Some(_)) => {
                        return Err(StorageError::already_exists("type definition", record.id))
                    }
                    (Some(_), None) => {
                        return Err(StorageError::not_found("type definition", record.id))
                    }
                    (Some(expected), Some(found)) if *expected != found => {
                        return Err(StorageError::ConcurrentConflict {
                            kind: "type definition",
                            id: record.id.to_string(),
                            expected_version: *expected,
                        })
                    }
                    (Some(_), Some(_)) => {}
                }
                let key = (record.scope, record.type_code.clone());
                let committed_clash = tables
                    .definitions
                    .values()
                    .any(|d| d.id != record.id && d.scope == record.scope && d.type_code == key.1);
                let staged_clash = self
                    .definition_codes
                    .get(&key)
                    .is_some_and(|id| *id != record.id);
                if committed_clash || staged_clash {
                    return Err(StorageError::DuplicateKey {
                        kind: "type definition code",
                        key: record.type_code.clone(),
                    });
                }
                self.definition_codes.insert(key, record.id);
                self.definitions
                    .insert(record.id, expected_version.map_or(record.version, |v| v + 1));
            }
            StagedWrite::InsertTicket(record) => {
                if self.ticket_version(tables, record.id).is_some() {
                    return Err(StorageError::already_exists("ticket", record.id));
                }
                self.tickets.insert(record.id, record.version);
            }
            StagedWrite::UpdateTicket {
                record,
                expected_version,
            } => {
                let found = self
                    .ticket_version(tables, record.id)
                    .ok_or_else(|| StorageError::not_found("ticket", record.id))?;
                if found != *expected_version {
                    return Err(StorageError::ConcurrentConflict {
                        kind: "ticket",
                        id: record.id.to_string(),
                        expected_version: *expected_version,
                    });
                }
                self.tickets.insert(record.id, expected_version + 1);
            }
            StagedWrite::InsertItem(record) => {
                if self.item_version(tables, record.id).is_some() {
                    return Err(StorageError::already_exists("ticket item", record.id));
                }
                if self.ticket_version(tables, record.ticket_id).is_none() {
                    return Err(StorageError::not_found("ticket", record.ticket_id));
                }
                self.items.insert(record.id, record.version);
            }
            StagedWrite::UpdateItem {
                record,
                expected_version,
            } => {
                let found = self
                    .item_version(tables, record.id)
                    .ok_or_else(|| StorageError::not_found("ticket item", record.id))?;
                if found != *expected_version {
                    return Err(StorageError::ConcurrentConflict {
                        kind: "ticket item",
                        id: record.id.to_string(),
                        expected_version: *expected_version,
                    });
                }
                self.items.insert(record.id, expected_version + 1);
            }
            StagedWrite::AppendTransition(record) => {
                if self.ticket_version(tables, record.ticket_id).is_none() {
                    return Err(StorageError::not_found("ticket", record.ticket_id));
                }
                if let Some(item_id) = record.item_id {
                    if self.item_version(tables, item_id).is_none() {
                        return Err(StorageError::not_found("ticket item", item_id));
                    }
                }
            }
            StagedWrite::AppendMovement(record) => {
                if self.ticket_version(tables, record.ticket_id).is_none() {
                    return Err(StorageError::not_found("ticket", record.ticket_id));
                }
            }
            StagedWrite::QueuePushBack {
                queue_id,
                ticket_id,
            } => {
                let order = self.queue_order(tables, *queue_id)?;
                if order.contains(ticket_id) {
                    return Err(StorageError::already_exists("queue membership", ticket_id));
                }
                order.push(*ticket_id);
            }
            StagedWrite::QueueRemove {
                queue_id,
                ticket_id,
            } => {
                let order = self.queue_order(tables, *queue_id)?;
                let index = order
                    .iter()
                    .position(|t| t == ticket_id)
                    .ok_or_else(|| StorageError::not_found("queue membership", ticket_id))?;
                order.remove(index);
            }
            StagedWrite::QueueReposition {
                queue_id,
                ticket_id,
                position,
            } => {
                let order = self.queue_order(tables, *queue_id)?;
                let index = order
                    .iter()
                    .position(|t| t == ticket_id)
                    .ok_or_else(|| StorageError::not_found("queue membership", ticket_id))?;
                let ticket = order.remove(index);
                let target = (*position).min(order.len());
                order.insert(target, ticket);
            }
        }
        Ok(())
    }
}

fn plan<'a>(
    tables: &Tables,
    writes: impl IntoIterator<Item = &'a StagedWrite>,
) -> Result<Plan, StorageError> {
    let mut plan = Plan::default();
    for write in writes {
        plan.check(tables, write)?;
    }
    Ok(plan)
}

fn apply(tables: &mut Tables, writes: Vec<StagedWrite>, plan: Plan) {
    for write in writes {
        match write {
            StagedWrite::PutTenant(mut record) => {
                record.seq = match tables.tenants.get(&record.id) {
                    Some(existing) => existing.seq,
                    None => tables.allocate_seq(),
                };
                tables.tenants.insert(record.id, record);
            }
            StagedWrite::PutQueue(mut record) => {
                record.seq = match tables.queues.get(&record.id) {
                    Some(existing) => existing.seq,
                    None => tables.allocate_seq(),
                };
                tables.queues.insert(record.id, record);
            }
            StagedWrite::PutEmployee(mut record) => {
                record.seq = match tables.employees.get(&record.id) {
                    Some(existing) => existing.seq,
                    None => tables.allocate_seq(),
                };
                tables.employees.insert(record.id, record);
            }
            StagedWrite::PutTypeDefinition {
                mut record,
                expected_version,
            } => {
                record.seq = match tables.definitions.get(&record.id) {
                    Some(existing) => existing.seq,
                    None => tables.allocate_seq(),
                };
                if let Some(expected) = expected_version {
                    record.version = expected + 1;
                }
                tables.definitions.insert(record.id, record);
            }
            StagedWrite::InsertTicket(mut record) => {
                record.seq = tables.allocate_seq();
                tables.tickets.insert(record.id, record);
            }
            StagedWrite::UpdateTicket {
                mut record,
                expected_version,
            } => {
                record.version = expected_version + 1;
                record.seq = tables.tickets.get(&record.id).map_or(0, |t| t.seq);
                tables.tickets.insert(record.id, record);
            }
            StagedWrite::InsertItem(mut record) => {
                record.seq = tables.allocate_seq();
                tables.items.insert(record.id, record);
            }
            StagedWrite::UpdateItem {
                mut record,
                expected_version,
            } => {
                record.version = expected_version + 1;
                record.seq = tables.items.get(&record.id).map_or(0, |i| i.seq);
                tables.items.insert(record.id, record);
            }
            StagedWrite::AppendTransition(mut record) => {
                record.seq = tables.allocate_seq();
                tables.transitions.push(record);
            }
            StagedWrite::AppendMovement(mut record) => {
                record.seq = tables.allocate_seq();
                tables.movements.push(record);
            }
            StagedWrite::QueuePushBack { .. }
            | StagedWrite::QueueRemove { .. }
            | StagedWrite::QueueReposition { .. } => {}
        }
    }
    for (queue_id, order) in plan.queue_orders {
        tables.queue_members.insert(queue_id, order);
    }
}

// ── Storage ──────────────────────────────────────────────────────────────────

/// In-memory [`TicketStorage`] for tests, tools, and single-process use.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
    /// Commits still to be failed with `Unavailable`.
    injected_failures: AtomicU32,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` commits with a transient error, discarding their
    /// snapshots. Used to exercise retry paths.
    pub fn fail_next_commits(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    async fn stage(
        &self,
        snapshot: &mut MemorySnapshot,
        write: StagedWrite,
    ) -> Result<(), StorageError> {
        let tables = self.tables.read().await;
        plan(&tables, snapshot.writes.iter().chain(std::iter::once(&write)))?;
        snapshot.writes.push(write);
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TicketStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        if self.take_injected_failure() {
            return Err(StorageError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        let plan = plan(&tables, snapshot.writes.iter()).inspect_err(|e| {
            tracing::debug!(error = %e, writes = snapshot.writes.len(), "snapshot rejected at commit");
        })?;
        apply(&mut tables, snapshot.writes, plan);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn put_tenant(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TenantRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, StagedWrite::PutTenant(record)).await
    }

    async fn put_queue(
        &self,
        snapshot: &mut MemorySnapshot,
        record: QueueRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, StagedWrite::PutQueue(record)).await
    }

    async fn put_employee(
        &self,
        snapshot: &mut MemorySnapshot,
        record: EmployeeRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, StagedWrite::PutEmployee(record)).await
    }

    async fn put_type_definition(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TypeDefinitionRecord,
        expected_version: Option<i64>,
    ) -> Result<(), StorageError> {
        self.stage(
            snapshot,
            StagedWrite::PutTypeDefinition {
                record,
                expected_version,
            },
        )
        .await
    }

    async fn insert_ticket(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TicketRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, StagedWrite::InsertTicket(record)).await
    }

    async fn update_ticket(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TicketRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        self.stage(
            snapshot,
            StagedWrite::UpdateTicket {
                record,
                expected_version,
            },
        )
        .await?;
        Ok(expected_version + 1)
    }

    async fn insert_item(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TicketItemRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, StagedWrite::InsertItem(record)).await
    }

    async fn update_item(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TicketItemRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        self.stage(
            snapshot,
            StagedWrite::UpdateItem {
                record,
                expected_version,
            },
        )
        .await?;
        Ok(expected_version + 1)
    }

    async fn append_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TransitionRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, StagedWrite::AppendTransition(record))
            .await
    }

    async fn append_movement(
        &self,
        snapshot: &mut MemorySnapshot,
        record: MovementRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, StagedWrite::AppendMovement(record)).await
    }

    async fn queue_push_back(
        &self,
        snapshot: &mut MemorySnapshot,
        queue_id: QueueId,
        ticket_id: TicketId,
    ) -> Result<(), StorageError> {
        self.stage(
            snapshot,
            StagedWrite::QueuePushBack {
                queue_id,
                ticket_id,
            },
        )
        .await
    }

    async fn queue_remove(
        &self,
        snapshot: &mut MemorySnapshot,
        queue_id: QueueId,
        ticket_id: TicketId,
    ) -> Result<(), StorageError> {
        self.stage(
            snapshot,
            StagedWrite::QueueRemove {
                queue_id,
                ticket_id,
            },
        )
        .await
    }

    async fn queue_reposition(
        &self,
        snapshot: &mut MemorySnapshot,
        queue_id: QueueId,
        ticket_id: TicketId,
        position: usize,
    ) -> Result<(), StorageError> {
        self.stage(
            snapshot,
            StagedWrite::QueueReposition {
                queue_id,
                ticket_id,
                position,
            },
        )
        .await
    }

    async fn get_tenant(&self, id: TenantId) -> Result<TenantRecord, StorageError> {
        let tables = self.tables.read().await;
        tables
            .tenants
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("tenant", id))
    }

    async fn get_queue(&self, id: QueueId) -> Result<QueueRecord, StorageError> {
        let tables = self.tables.read().await;
        tables
            .queues
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("queue", id))
    }

    async fn get_employee(&self, id: EmployeeId) -> Result<EmployeeRecord, StorageError> {
        let tables = self.tables.read().await;
        tables
            .employees
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("employee", id))
    }

    async fn get_type_definition(
        &self,
        id: TypeDefinitionId,
    ) -> Result<TypeDefinitionRecord, StorageError> {
        let tables = self.tables.read().await;
        tables
            .definitions
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("type definition", id))
    }

    async fn list_type_definitions(
        &self,
        scope: DefinitionScope,
    ) -> Result<Vec<TypeDefinitionRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .definitions
            .values()
            .filter(|d| d.scope == scope)
            .cloned()
            .collect();
        records.sort_by_key(|d| d.seq);
        Ok(records)
    }

    async fn get_ticket(&self, id: TicketId) -> Result<TicketRecord, StorageError> {
        let tables = self.tables.read().await;
        tables
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("ticket", id))
    }

    async fn get_item(&self, id: TicketItemId) -> Result<TicketItemRecord, StorageError> {
        let tables = self.tables.read().await;
        tables
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("ticket item", id))
    }

    async fn list_items(&self, ticket_id: TicketId) -> Result<Vec<TicketItemRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut items: Vec<_> = tables
            .items
            .values()
            .filter(|i| i.ticket_id == ticket_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.seq);
        Ok(items)
    }

    async fn list_transitions(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<TransitionRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .transitions
            .iter()
            .filter(|r| r.ticket_id == ticket_id && r.item_id.is_none())
            .cloned()
            .collect())
    }

    async fn list_item_transitions(
        &self,
        item_id: TicketItemId,
    ) -> Result<Vec<TransitionRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .transitions
            .iter()
            .filter(|r| r.item_id == Some(item_id))
            .cloned()
            .collect())
    }

    async fn list_movements(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<MovementRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn list_queue_tickets(
        &self,
        queue_id: QueueId,
    ) -> Result<Vec<TicketRecord>, StorageError> {
        let tables = self.tables.read().await;
        if !tables.queues.contains_key(&queue_id) {
            return Err(StorageError::not_found("queue", queue_id));
        }
        Ok(tables
            .queue_members
            .get(&queue_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.tickets.get(id).cloned())
            .collect())
    }

    async fn queue_position(
        &self,
        queue_id: QueueId,
        ticket_id: TicketId,
    ) -> Result<Option<usize>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .queue_members
            .get(&queue_id)
            .and_then(|members| members.iter().position(|t| *t == ticket_id)))
    }

    async fn list_child_tickets(
        &self,
        parent: TicketId,
    ) -> Result<Vec<TicketRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut children: Vec<_> = tables
            .tickets
            .values()
            .filter(|t| t.parent_ticket_id == Some(parent))
            .cloned()
            .collect();
        children.sort_by_key(|t| t.seq);
        Ok(children)
    }

    async fn list_expired_tickets(
        &self,
        tenant_id: TenantId,
        now: OffsetDateTime,
    ) -> Result<Vec<TicketRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut expired: Vec<_> = tables
            .tickets
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.expires_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        expired.sort_by_key(|t| t.seq);
        Ok(expired)
    }
}
