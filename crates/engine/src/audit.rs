//! Audit Recorder.
//!
//! Records are staged in the caller's snapshot, next to the state change
//! they document, so both commit or neither does. Reads return records
//! oldest first and are tenant-checked through the owning ticket.

use std::sync::Arc;

use time::OffsetDateTime;

use ticketflow_core::{Actor, MovementRecordId, TenantId, TicketId, TicketItemId, TransitionRecordId};
use ticketflow_storage::{
    MovementKind, MovementRecord, StorageError, TicketRecord, TicketStorage, TransitionRecord,
};

use crate::error::{AttemptError, LifecycleError};
use crate::retry::RetryPolicy;

/// One accepted state change, as handed to [`AuditRecorder::record`].
#[derive(Debug, Clone, Copy)]
pub struct AuditEntry<'a> {
    pub ticket_id: TicketId,
    pub item_id: Option<TicketItemId>,
    /// `None` for the record written at creation.
    pub transition: Option<&'a str>,
    pub previous_state: Option<&'a str>,
    pub new_state: &'a str,
    pub actor: Actor,
    pub notes: Option<&'a str>,
    pub at: OffsetDateTime,
}

pub struct AuditRecorder<S: TicketStorage> {
    storage: Arc<S>,
    retry: RetryPolicy,
}

impl<S: TicketStorage> AuditRecorder<S> {
    pub fn new(storage: Arc<S>, retry: RetryPolicy) -> Self {
        Self { storage, retry }
    }

    pub async fn record(
        &self,
        snapshot: &mut S::Snapshot,
        entry: AuditEntry<'_>,
    ) -> Result<(), StorageError> {
        let record = TransitionRecord {
            id: TransitionRecordId::new(),
            seq: 0,
            ticket_id: entry.ticket_id,
            item_id: entry.item_id,
            transition_name: entry.transition.map(str::to_string),
            previous_state: entry.previous_state.map(str::to_string),
            new_state: entry.new_state.to_string(),
            actor: entry.actor,
            notes: entry.notes.map(str::to_string),
            recorded_at: entry.at,
        };
        self.storage.append_transition(snapshot, record).await
    }

    pub async fn record_movement(
        &self,
        snapshot: &mut S::Snapshot,
        ticket_id: TicketId,
        kind: MovementKind,
        actor: Actor,
        reason: Option<&str>,
        at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        let record = MovementRecord {
            id: MovementRecordId::new(),
            seq: 0,
            ticket_id,
            kind,
            actor,
            reason: reason.map(str::to_string),
            recorded_at: at,
        };
        self.storage.append_movement(snapshot, record).await
    }

    /// Ticket-level transition records, oldest first.
    pub async fn history(
        &self,
        tenant: TenantId,
        ticket: TicketId,
    ) -> Result<Vec<TransitionRecord>, LifecycleError> {
        self.retry
            .run("ticket_history", move || async move {
                self.owned_ticket(tenant, ticket).await?;
                Ok(self.storage.list_transitions(ticket).await?)
            })
            .await
    }

    pub async fn item_history(
        &self,
        tenant: TenantId,
        item: TicketItemId,
    ) -> Result<Vec<TransitionRecord>, LifecycleError> {
        self.retry
            .run("item_history", move || async move {
                let record = self.storage.get_item(item).await?;
                self.owned_ticket(tenant, record.ticket_id).await?;
                Ok(self.storage.list_item_transitions(item).await?)
            })
            .await
    }

    /// Forwarding and repositioning records, oldest first.
    pub async fn movements(
        &self,
        tenant: TenantId,
        ticket: TicketId,
    ) -> Result<Vec<MovementRecord>, LifecycleError> {
        self.retry
            .run("ticket_movements", move || async move {
                self.owned_ticket(tenant, ticket).await?;
                Ok(self.storage.list_movements(ticket).await?)
            })
            .await
    }

    async fn owned_ticket(
        &self,
        tenant: TenantId,
        ticket: TicketId,
    ) -> Result<TicketRecord, AttemptError> {
        owned_ticket(self.storage.as_ref(), tenant, ticket).await
    }
}

/// Load a ticket and check it belongs to `tenant`.
pub(crate) async fn owned_ticket<S: TicketStorage>(
    storage: &S,
    tenant: TenantId,
    ticket: TicketId,
) -> Result<TicketRecord, AttemptError> {
    let record = storage.get_ticket(ticket).await?;
    if record.tenant_id != tenant {
        return Err(
            LifecycleError::tenant_mismatch(tenant, record.tenant_id, "ticket", ticket).into(),
        );
    }
    Ok(record)
}
