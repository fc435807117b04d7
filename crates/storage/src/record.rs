use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use ticketflow_core::{
    Actor, DefinitionScope, EmployeeId, MovementRecordId, PersonId, QueueId, TenantId, TicketId,
    TicketItemId, TransitionRecordId, TypeDefinitionId,
};

/// Every record carries an internal `seq`, assigned by the backend at commit
/// and strictly increasing. Callers constructing a record leave it at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub seq: i64,
    pub name: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: QueueId,
    pub seq: i64,
    pub tenant_id: TenantId,
    pub name: String,
    pub accepted_type_ids: Vec<TypeDefinitionId>,
    /// Disabling blocks new tickets only; existing tickets keep moving.
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl QueueRecord {
    pub fn accepts(&self, type_id: TypeDefinitionId) -> bool {
        self.accepted_type_ids.contains(&type_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub seq: i64,
    pub tenant_id: TenantId,
    pub name: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A stored Type Definition. The document is kept raw; it is compiled when
/// loaded, never interpreted per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinitionRecord {
    pub id: TypeDefinitionId,
    pub seq: i64,
    pub scope: DefinitionScope,
    pub type_code: String,
    pub document: serde_json::Value,
    /// Bumped on every update; used for cache invalidation and OCC.
    pub version: i64,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: TicketId,
    pub seq: i64,
    pub version: i64,
    /// Owning tenant, copied from the queue at creation.
    pub tenant_id: TenantId,
    pub queue_id: QueueId,
    pub previous_queue_id: Option<QueueId>,
    pub type_definition_id: TypeDefinitionId,
    pub current_state: String,
    pub person_id: Option<PersonId>,
    /// Workflow chaining: a non-owning reference, resolved on demand.
    pub parent_ticket_id: Option<TicketId>,
    pub assigned_employee_id: Option<EmployeeId>,
    pub payload: serde_json::Value,
    pub ttl_minutes: Option<u32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub state_entered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ready_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketItemRecord {
    pub id: TicketItemId,
    pub seq: i64,
    pub version: i64,
    pub ticket_id: TicketId,
    pub type_definition_id: TypeDefinitionId,
    /// Permanently `None` when the item's type has no state machine.
    pub current_state: Option<String>,
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub state_entered_at: Option<OffsetDateTime>,
}

/// One accepted state change. Append-only.
///
/// Ticket-level records have `item_id = None`; item-level records name the
/// item and carry the owning ticket for scoping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: TransitionRecordId,
    pub seq: i64,
    pub ticket_id: TicketId,
    pub item_id: Option<TicketItemId>,
    /// `None` for the initial record.
    pub transition_name: Option<String>,
    pub previous_state: Option<String>,
    pub new_state: String,
    pub actor: Actor,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementKind {
    Forwarded {
        from_queue: QueueId,
        to_queue: QueueId,
    },
    Repositioned {
        from_position: usize,
        to_position: usize,
    },
}

/// A change to where a ticket sits that is not a state change. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementRecordId,
    pub seq: i64,
    pub ticket_id: TicketId,
    pub kind: MovementKind,
    pub actor: Actor,
    pub reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}
