use async_trait::async_trait;
use time::OffsetDateTime;

use ticketflow_core::{
    DefinitionScope, EmployeeId, QueueId, TenantId, TicketId, TicketItemId, TypeDefinitionId,
};

use crate::error::StorageError;
use crate::record::{
    EmployeeRecord, MovementRecord, QueueRecord, TenantRecord, TicketItemRecord, TicketRecord,
    TransitionRecord, TypeDefinitionRecord,
};

/// Durable state behind the lifecycle engine: tenants, queues, employees,
/// type definitions, tickets, items, queue order, and the append-only audit
/// records.
///
/// Every write goes through a snapshot. An operation opens one with
/// `begin_snapshot`, stages its writes against `&mut snapshot`, then either
/// hands it to `commit_snapshot` or drops it (`abort_snapshot` does the same
/// thing explicitly). Staged writes are invisible to other readers until the
/// commit, and a commit applies all of them or none. A request that is
/// cancelled mid-flight therefore leaves no trace.
///
/// `update_ticket` and `update_item` take the version the caller last read.
/// The check runs when the write is staged and again at commit; a stale
/// version yields [`StorageError::ConcurrentConflict`] and the caller
/// re-reads and retries.
#[async_trait]
pub trait TicketStorage: Send + Sync + 'static {
    /// An open unit of work.
    type Snapshot: Send;

    // ── Snapshots ────────────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Configuration records (within snapshot) ──────────────────────────────

    /// Insert or replace a tenant.
    async fn put_tenant(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TenantRecord,
    ) -> Result<(), StorageError>;

    /// Insert or replace a queue. The owning tenant must exist.
    async fn put_queue(
        &self,
        snapshot: &mut Self::Snapshot,
        record: QueueRecord,
    ) -> Result<(), StorageError>;

    /// Insert or replace an employee. The owning tenant must exist.
    async fn put_employee(
        &self,
        snapshot: &mut Self::Snapshot,
        record: EmployeeRecord,
    ) -> Result<(), StorageError>;

    /// Insert (`expected_version = None`) or version-checked replace of a
    /// type definition. `(scope, type_code)` must stay unique.
    async fn put_type_definition(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TypeDefinitionRecord,
        expected_version: Option<i64>,
    ) -> Result<(), StorageError>;

    // ── Tickets and items (within snapshot) ──────────────────────────────────

    /// Returns `Err(StorageError::AlreadyExists)` if the ticket id is taken.
    async fn insert_ticket(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TicketRecord,
    ) -> Result<(), StorageError>;

    /// Replace a ticket if its committed version equals `expected_version`.
    ///
    /// Returns the new version (`expected_version + 1`), which the stored
    /// record carries after commit.
    async fn update_ticket(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TicketRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    async fn insert_item(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TicketItemRecord,
    ) -> Result<(), StorageError>;

    async fn update_item(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TicketItemRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    // ── Audit records (within snapshot) ──────────────────────────────────────

    /// Append a transition record.
    ///
    /// Must be staged in the SAME snapshot as the state change it documents;
    /// that is what guarantees no state change without an audit record.
    async fn append_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TransitionRecord,
    ) -> Result<(), StorageError>;

    async fn append_movement(
        &self,
        snapshot: &mut Self::Snapshot,
        record: MovementRecord,
    ) -> Result<(), StorageError>;

    // ── Queue ordering (within snapshot) ─────────────────────────────────────

    /// Place a ticket at the tail of a queue.
    async fn queue_push_back(
        &self,
        snapshot: &mut Self::Snapshot,
        queue_id: QueueId,
        ticket_id: TicketId,
    ) -> Result<(), StorageError>;

    async fn queue_remove(
        &self,
        snapshot: &mut Self::Snapshot,
        queue_id: QueueId,
        ticket_id: TicketId,
    ) -> Result<(), StorageError>;

    /// Move a ticket to `position` (0-based, clamped to the tail). Only the
    /// tickets between the old and new position shift by one.
    async fn queue_reposition(
        &self,
        snapshot: &mut Self::Snapshot,
        queue_id: QueueId,
        ticket_id: TicketId,
        position: usize,
    ) -> Result<(), StorageError>;

    // ── Queries (outside snapshot, committed state only) ─────────────────────

    async fn get_tenant(&self, id: TenantId) -> Result<TenantRecord, StorageError>;

    async fn get_queue(&self, id: QueueId) -> Result<QueueRecord, StorageError>;

    async fn get_employee(&self, id: EmployeeId) -> Result<EmployeeRecord, StorageError>;

    async fn get_type_definition(
        &self,
        id: TypeDefinitionId,
    ) -> Result<TypeDefinitionRecord, StorageError>;

    /// Definitions with exactly this scope, ordered by `seq`.
    async fn list_type_definitions(
        &self,
        scope: DefinitionScope,
    ) -> Result<Vec<TypeDefinitionRecord>, StorageError>;

    async fn get_ticket(&self, id: TicketId) -> Result<TicketRecord, StorageError>;

    async fn get_item(&self, id: TicketItemId) -> Result<TicketItemRecord, StorageError>;

    /// Items of a ticket, oldest first.
    async fn list_items(&self, ticket_id: TicketId) -> Result<Vec<TicketItemRecord>, StorageError>;

    /// Ticket-level transition records, oldest first.
    async fn list_transitions(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<TransitionRecord>, StorageError>;

    async fn list_item_transitions(
        &self,
        item_id: TicketItemId,
    ) -> Result<Vec<TransitionRecord>, StorageError>;

    async fn list_movements(&self, ticket_id: TicketId)
        -> Result<Vec<MovementRecord>, StorageError>;

    /// Tickets currently in a queue, in queue order.
    async fn list_queue_tickets(&self, queue_id: QueueId)
        -> Result<Vec<TicketRecord>, StorageError>;

    async fn queue_position(
        &self,
        queue_id: QueueId,
        ticket_id: TicketId,
    ) -> Result<Option<usize>, StorageError>;

    /// Tickets whose `parent_ticket_id` is `parent`, oldest first.
    async fn list_child_tickets(&self, parent: TicketId)
        -> Result<Vec<TicketRecord>, StorageError>;

    /// Tickets of a tenant whose `expires_at` is at or before `now`, oldest first.
    async fn list_expired_tickets(
        &self,
        tenant_id: TenantId,
        now: OffsetDateTime,
    ) -> Result<Vec<TicketRecord>, StorageError>;
}
