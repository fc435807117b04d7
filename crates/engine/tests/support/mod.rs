//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use serde_json::json;

use ticketflow_core::transition::{self, ReplayStep};
use ticketflow_core::{
    DefinitionScope, QueueId, TenantId, TicketId, TypeDefinition, TypeDefinitionDocument,
    TypeDefinitionId,
};
use ticketflow_engine::{Engine, EngineConfig, NewTicket};
use ticketflow_storage::{MemoryStorage, TicketRecord, TicketStorage};

// ──────────────────────────────────────────────
// Definitions
// ──────────────────────────────────────────────

/// A repair desk: received → in_progress → ready → picked_up, cancellable
/// while received or in progress. Payload must name the customer.
pub fn repair_document() -> TypeDefinitionDocument {
    TypeDefinitionDocument::from_json(&json!({
        "typeCode": "repair",
        "typeName": "Repair order",
        "structuralSchema": {
            "type": "object",
            "required": ["customer"],
            "properties": {
                "customer": { "type": "string" },
                "device": { "type": "string" }
            }
        },
        "stateMachine": {
            "initialState": "received",
            "states": ["received", "in_progress", "ready", "picked_up", "cancelled"],
            "transitions": [
                { "name": "start", "from": "received", "to": "in_progress" },
                { "name": "finish", "from": "in_progress", "to": "ready" },
                { "name": "pick_up", "from": "ready", "to": "picked_up" },
                { "name": "cancel", "from": "received", "to": "cancelled" },
                { "name": "cancel", "from": "in_progress", "to": "cancelled" }
            ],
            "milestones": {
                "ready": "ready",
                "completed": "picked_up",
                "cancelled": "cancelled"
            }
        }
    }))
    .unwrap()
}

/// States {A, B, C}; t1: A → B, t2: B → C. No schema.
pub fn abc_document() -> TypeDefinitionDocument {
    TypeDefinitionDocument::from_json(&json!({
        "typeCode": "abc",
        "typeName": "ABC",
        "stateMachine": {
            "initialState": "A",
            "states": ["A", "B", "C"],
            "transitions": [
                { "name": "t1", "from": "A", "to": "B" },
                { "name": "t2", "from": "B", "to": "C" }
            ]
        }
    }))
    .unwrap()
}

/// An item kind with its own two-state machine.
pub fn part_document() -> TypeDefinitionDocument {
    TypeDefinitionDocument::from_json(&json!({
        "typeCode": "part",
        "typeName": "Spare part",
        "kind": "item",
        "structuralSchema": {
            "type": "object",
            "required": ["sku"],
            "properties": { "sku": { "type": "string" } }
        },
        "stateMachine": {
            "initialState": "ordered",
            "states": ["ordered", "delivered"],
            "transitions": [{ "name": "deliver", "from": "ordered", "to": "delivered" }]
        }
    }))
    .unwrap()
}

/// An item kind without a state machine.
pub fn note_document() -> TypeDefinitionDocument {
    TypeDefinitionDocument::from_json(&json!({
        "typeCode": "note",
        "typeName": "Note",
        "kind": "item"
    }))
    .unwrap()
}

pub fn with_nested(
    mut document: TypeDefinitionDocument,
    items: &[TypeDefinitionId],
) -> TypeDefinitionDocument {
    document.nested_item_type_ids = items.to_vec();
    document
}

// ──────────────────────────────────────────────
// Fixture
// ──────────────────────────────────────────────

/// One tenant with one active queue accepting the repair type.
pub struct Fixture {
    pub engine: Engine<MemoryStorage>,
    pub tenant: TenantId,
    pub queue: QueueId,
    pub repair: TypeDefinitionId,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let engine = Engine::in_memory(config);
        let tenant = engine.directory().create_tenant("acme").await.unwrap().id;
        let repair = engine
            .registry()
            .register(DefinitionScope::Tenant(tenant), repair_document())
            .await
            .unwrap()
            .id();
        let queue = engine
            .directory()
            .create_queue(tenant, "front desk", vec![repair])
            .await
            .unwrap()
            .id;
        Self {
            engine,
            tenant,
            queue,
            repair,
        }
    }

    pub fn repair_request(&self, customer: &str) -> NewTicket {
        NewTicket::new(self.queue, self.repair, json!({ "customer": customer }))
    }

    pub async fn create(&self, customer: &str) -> TicketRecord {
        self.engine
            .lifecycle()
            .create_ticket(self.tenant, self.repair_request(customer))
            .await
            .unwrap()
    }

    /// A second tenant with its own queue and copy of the repair type.
    pub async fn other_tenant(&self) -> (TenantId, QueueId, TypeDefinitionId) {
        let tenant = self
            .engine
            .directory()
            .create_tenant("globex")
            .await
            .unwrap()
            .id;
        let repair = self
            .engine
            .registry()
            .register(DefinitionScope::Tenant(tenant), repair_document())
            .await
            .unwrap()
            .id();
        let queue = self
            .engine
            .directory()
            .create_queue(tenant, "workshop", vec![repair])
            .await
            .unwrap()
            .id;
        (tenant, queue, repair)
    }

    pub async fn queue_order(&self, queue: QueueId) -> Vec<TicketId> {
        self.engine
            .storage()
            .list_queue_tickets(queue)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect()
    }

    /// Replay a ticket's recorded history and check it lands on the
    /// ticket's current state, which must be declared by its type.
    pub async fn assert_consistent(&self, ticket: TicketId) {
        let record = self
            .engine
            .lifecycle()
            .get_ticket(self.tenant, ticket)
            .await
            .unwrap();
        let definition: std::sync::Arc<TypeDefinition> = self
            .engine
            .registry()
            .get(self.tenant, record.type_definition_id)
            .await
            .unwrap();
        let machine = definition.machine().unwrap();
        assert!(machine.has_state(&record.current_state));

        let history = self
            .engine
            .audit()
            .history(self.tenant, ticket)
            .await
            .unwrap();
        let replayed = transition::replay(
            machine,
            history.iter().map(|r| ReplayStep {
                transition: r.transition_name.as_deref(),
                previous_state: r.previous_state.as_deref(),
                new_state: &r.new_state,
            }),
        )
        .unwrap();
        assert_eq!(replayed, record.current_state);
    }
}
