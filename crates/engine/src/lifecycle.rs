//! Ticket Lifecycle Manager.
//!
//! Every mutating operation is one unit of work: read the current records,
//! validate against the compiled definition, stage the new state together
//! with its audit record (and any queue ordering change) in one snapshot,
//! commit. Units touching an existing ticket hold that ticket's lock for the
//! whole read-validate-write, so a second request always validates against
//! the state the first one left behind. Ticket and item updates are still
//! version-checked at commit for writers outside this process.
//!
//! Lock order: ticket, then queue(s).
//!
//! Every operation takes the caller's tenant explicitly and checks it
//! against the owning tenant of each record it touches before staging
//! anything.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use ticketflow_core::schema;
use ticketflow_core::transition;
use ticketflow_core::{
    Actor, DefinitionKind, EmployeeId, Milestone, PersonId, QueueId, StateMachine, TenantId,
    TicketId, TicketItemId, TypeDefinitionId,
};
use ticketflow_storage::{
    MovementKind, TicketItemRecord, TicketRecord, TicketStorage,
};

use crate::audit::{owned_ticket, AuditEntry, AuditRecorder};
use crate::config::TicketConfig;
use crate::directory::TenantDirectory;
use crate::error::{AttemptError, LifecycleError};
use crate::locks::KeyedLocks;
use crate::queue_index::QueueMembershipIndex;
use crate::registry::SchemaRegistry;
use crate::retry::RetryPolicy;

/// A ticket creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub queue_id: QueueId,
    pub type_definition_id: TypeDefinitionId,
    pub payload: serde_json::Value,
    pub person_id: Option<PersonId>,
    /// Workflow chaining: must be a ticket of the same tenant.
    pub parent_ticket_id: Option<TicketId>,
    pub ttl_minutes: Option<u32>,
    /// `None` = created by the system.
    pub created_by: Option<EmployeeId>,
}

impl NewTicket {
    pub fn new(
        queue_id: QueueId,
        type_definition_id: TypeDefinitionId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            queue_id,
            type_definition_id,
            payload,
            person_id: None,
            parent_ticket_id: None,
            ttl_minutes: None,
            created_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub type_definition_id: TypeDefinitionId,
    pub payload: serde_json::Value,
    pub created_by: Option<EmployeeId>,
}

/// Result of an accepted ticket transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub ticket: TicketRecord,
    pub previous_state: String,
    pub current_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTransitionOutcome {
    pub item: TicketItemRecord,
    pub previous_state: String,
    pub current_state: String,
}

#[derive(Debug, Clone, Copy)]
enum Requested<'a> {
    Named(&'a str),
    /// Whichever cancellation transition the machine offers from the
    /// current state.
    Cancellation,
}

pub struct LifecycleManager<S: TicketStorage> {
    storage: Arc<S>,
    registry: Arc<SchemaRegistry<S>>,
    directory: Arc<TenantDirectory<S>>,
    audit: Arc<AuditRecorder<S>>,
    queues: Arc<QueueMembershipIndex<S>>,
    ticket_locks: KeyedLocks<TicketId>,
    tickets: TicketConfig,
    retry: RetryPolicy,
}

impl<S: TicketStorage> LifecycleManager<S> {
    pub fn new(
        storage: Arc<S>,
        registry: Arc<SchemaRegistry<S>>,
        directory: Arc<TenantDirectory<S>>,
        audit: Arc<AuditRecorder<S>>,
        queues: Arc<QueueMembershipIndex<S>>,
        tickets: TicketConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            registry,
            directory,
            audit,
            queues,
            ticket_locks: KeyedLocks::default(),
            tickets,
            retry,
        }
    }

    // ── Tickets ──────────────────────────────────────────────────────────

    /// Create a ticket in its type's initial state at the tail of its queue.
    ///
    /// The returned record is what was written; its `seq` is assigned by
    /// storage and shows up on later reads.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, queue = %request.queue_id))]
    pub async fn create_ticket(
        &self,
        tenant: TenantId,
        request: NewTicket,
    ) -> Result<TicketRecord, LifecycleError> {
        if let Some(ttl) = request.ttl_minutes {
            if ttl == 0 || ttl > self.tickets.max_ttl_minutes {
                return Err(LifecycleError::invalid_request(format!(
                    "ttl_minutes must be between 1 and {}",
                    self.tickets.max_ttl_minutes
                )));
            }
        }
        let id = TicketId::new();
        let ticket = self
            .retry
            .run("create_ticket", || self.try_create(tenant, id, &request))
            .await?;
        tracing::info!(ticket = %id, state = %ticket.current_state, "ticket created");
        Ok(ticket)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant, ticket = %ticket_id, transition = transition))]
    pub async fn transition_ticket(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        transition: &str,
        employee: Option<EmployeeId>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.retry
            .run("transition_ticket", move || {
                self.try_transition(tenant, ticket_id, Requested::Named(transition), employee, None)
            })
            .await
    }

    /// Apply the cancellation transition available from the current state.
    /// Fails with `NoCancellationAvailable` when there is none.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, ticket = %ticket_id))]
    pub async fn cancel_ticket(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        reason: Option<&str>,
        employee: Option<EmployeeId>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.retry
            .run("cancel_ticket", move || {
                self.try_transition(tenant, ticket_id, Requested::Cancellation, employee, reason)
            })
            .await
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant, ticket = %ticket_id, employee = %employee))]
    pub async fn assign_employee(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        employee: EmployeeId,
    ) -> Result<TicketRecord, LifecycleError> {
        self.retry
            .run("assign_employee", move || async move {
                self.directory.active_tenant(tenant).await?;
                let _ticket = self.ticket_locks.lock(ticket_id).await;
                let current = owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
                self.directory.acting_employee(tenant, employee).await?;

                let mut updated = current.clone();
                updated.assigned_employee_id = Some(employee);
                updated.updated_at = OffsetDateTime::now_utc();
                let mut snap = self.storage.begin_snapshot().await?;
                updated.version = self
                    .storage
                    .update_ticket(&mut snap, updated.clone(), current.version)
                    .await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(updated)
            })
            .await
    }

    /// Move a ticket to the tail of another queue of the same tenant. The
    /// ticket's state is untouched; the move is recorded as a movement.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, ticket = %ticket_id, target = %target))]
    pub async fn forward_ticket(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        target: QueueId,
        reason: Option<&str>,
        employee: Option<EmployeeId>,
    ) -> Result<TicketRecord, LifecycleError> {
        let ticket = self
            .retry
            .run("forward_ticket", move || {
                self.try_forward(tenant, ticket_id, target, reason, employee)
            })
            .await?;
        tracing::info!(from = ?ticket.previous_queue_id, "ticket forwarded");
        Ok(ticket)
    }

    /// Move a ticket to `position` (0-based, clamped to the tail) within its
    /// queue. Only the tickets between the old and new position shift.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, ticket = %ticket_id, position = position))]
    pub async fn reorder_ticket(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        position: usize,
        reason: Option<&str>,
        employee: Option<EmployeeId>,
    ) -> Result<TicketRecord, LifecycleError> {
        self.retry
            .run("reorder_ticket", move || {
                self.try_reorder(tenant, ticket_id, position, reason, employee)
            })
            .await
    }

    pub async fn get_ticket(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
    ) -> Result<TicketRecord, LifecycleError> {
        self.retry
            .run("get_ticket", move || {
                owned_ticket(self.storage.as_ref(), tenant, ticket_id)
            })
            .await
    }

    /// Tickets chained to `ticket_id` through their parent reference.
    pub async fn linked_tickets(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketRecord>, LifecycleError> {
        self.retry
            .run("linked_tickets", move || async move {
                owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
                let children = self.storage.list_child_tickets(ticket_id).await?;
                Ok(children
                    .into_iter()
                    .filter(|t| t.tenant_id == tenant)
                    .collect())
            })
            .await
    }

    /// The ticket `ticket_id` is chained to, if any.
    pub async fn parent_ticket(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
    ) -> Result<Option<TicketRecord>, LifecycleError> {
        self.retry
            .run("parent_ticket", move || async move {
                let ticket = owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
                match ticket.parent_ticket_id {
                    Some(parent) => Ok(Some(
                        owned_ticket(self.storage.as_ref(), tenant, parent).await?,
                    )),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Tickets whose time-to-live has run out and that have not reached a
    /// completed or cancelled milestone.
    pub async fn expired_tickets(&self, tenant: TenantId) -> Result<Vec<TicketRecord>, LifecycleError> {
        self.expired_tickets_at(tenant, OffsetDateTime::now_utc())
            .await
    }

    pub async fn expired_tickets_at(
        &self,
        tenant: TenantId,
        now: OffsetDateTime,
    ) -> Result<Vec<TicketRecord>, LifecycleError> {
        self.retry
            .run("expired_tickets", move || async move {
                let candidates = self.storage.list_expired_tickets(tenant, now).await?;
                let mut open = Vec::with_capacity(candidates.len());
                for ticket in candidates {
                    let definition = self
                        .registry
                        .load(tenant, ticket.type_definition_id)
                        .await?;
                    let closed = definition
                        .machine()
                        .is_some_and(|m| m.is_closed(&ticket.current_state));
                    if !closed {
                        open.push(ticket);
                    }
                }
                Ok(open)
            })
            .await
    }

    // ── Items ────────────────────────────────────────────────────────────

    /// Add an item to a ticket. The item's type must be nested under the
    /// ticket's type as the ticket's type reads now.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, ticket = %ticket_id))]
    pub async fn add_item(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        request: NewItem,
    ) -> Result<TicketItemRecord, LifecycleError> {
        let id = TicketItemId::new();
        self.retry
            .run("add_item", || self.try_add_item(tenant, ticket_id, id, &request))
            .await
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant, item = %item_id, transition = transition))]
    pub async fn transition_item(
        &self,
        tenant: TenantId,
        item_id: TicketItemId,
        transition: &str,
        employee: Option<EmployeeId>,
    ) -> Result<ItemTransitionOutcome, LifecycleError> {
        self.retry
            .run("transition_item", move || {
                self.try_transition_item(tenant, item_id, transition, employee)
            })
            .await
    }

    pub async fn get_item(
        &self,
        tenant: TenantId,
        item_id: TicketItemId,
    ) -> Result<TicketItemRecord, LifecycleError> {
        self.retry
            .run("get_item", move || async move {
                let item = self.storage.get_item(item_id).await?;
                owned_ticket(self.storage.as_ref(), tenant, item.ticket_id).await?;
                Ok(item)
            })
            .await
    }

    pub async fn list_items(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketItemRecord>, LifecycleError> {
        self.retry
            .run("list_items", move || async move {
                owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
                Ok(self.storage.list_items(ticket_id).await?)
            })
            .await
    }

    // ── Units of work ────────────────────────────────────────────────────

    async fn try_create(
        &self,
        tenant: TenantId,
        id: TicketId,
        request: &NewTicket,
    ) -> Result<TicketRecord, AttemptError> {
        self.directory.active_tenant(tenant).await?;
        // Held through commit: the queue cannot be disabled or stop
        // accepting this type between the checks below and the insert.
        let guard = self.queues.lock(request.queue_id).await;
        let queue = self
            .directory
            .owned_queue(tenant, request.queue_id)
            .await?;
        if !queue.active {
            return Err(LifecycleError::QueueInactive { queue_id: queue.id }.into());
        }
        let type_not_allowed = || LifecycleError::TypeNotAllowed {
            queue_id: queue.id,
            type_definition_id: request.type_definition_id,
        };
        if !queue.accepts(request.type_definition_id) {
            return Err(type_not_allowed().into());
        }
        let definition = self
            .registry
            .load(tenant, request.type_definition_id)
            .await?;
        if !definition.is_active() || definition.kind() != DefinitionKind::Ticket {
            return Err(type_not_allowed().into());
        }
        let Some(machine) = definition.machine() else {
            return Err(type_not_allowed().into());
        };
        schema::validate(&request.payload, definition.schema())?;
        if let Some(parent) = request.parent_ticket_id {
            owned_ticket(self.storage.as_ref(), tenant, parent).await?;
        }
        let actor = self.actor(tenant, request.created_by).await?;

        let now = OffsetDateTime::now_utc();
        let expires_at = match request.ttl_minutes {
            Some(ttl) => Some(
                now.checked_add(Duration::minutes(i64::from(ttl)))
                    .ok_or_else(|| {
                        LifecycleError::invalid_request(format!(
                            "ttl_minutes {ttl} puts the expiry out of range"
                        ))
                    })?,
            ),
            None => None,
        };
        let initial = machine.initial_state();
        let mut ticket = TicketRecord {
            id,
            seq: 0,
            version: 0,
            tenant_id: tenant,
            queue_id: queue.id,
            previous_queue_id: None,
            type_definition_id: request.type_definition_id,
            current_state: initial.to_string(),
            person_id: request.person_id,
            parent_ticket_id: request.parent_ticket_id,
            assigned_employee_id: None,
            payload: request.payload.clone(),
            ttl_minutes: request.ttl_minutes,
            expires_at,
            created_at: now,
            updated_at: now,
            state_entered_at: now,
            ready_at: None,
            completed_at: None,
            cancelled_at: None,
        };
        stamp_milestones(&mut ticket, machine, initial, now);

        let mut snap = self.storage.begin_snapshot().await?;
        self.storage.insert_ticket(&mut snap, ticket.clone()).await?;
        self.queues.insert(&mut snap, &guard, queue.id, id).await?;
        self.audit
            .record(
                &mut snap,
                AuditEntry {
                    ticket_id: id,
                    item_id: None,
                    transition: None,
                    previous_state: None,
                    new_state: initial,
                    actor,
                    notes: None,
                    at: now,
                },
            )
            .await?;
        self.storage.commit_snapshot(snap).await?;
        Ok(ticket)
    }

    async fn try_transition(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        requested: Requested<'_>,
        employee: Option<EmployeeId>,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, AttemptError> {
        self.directory.active_tenant(tenant).await?;
        let _ticket = self.ticket_locks.lock(ticket_id).await;
        let current = owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
        let actor = self.actor(tenant, employee).await?;
        let definition = self
            .registry
            .load(tenant, current.type_definition_id)
            .await?;

        let name = match requested {
            Requested::Named(name) => name,
            Requested::Cancellation => definition
                .machine()
                .and_then(|m| m.cancellation_from(&current.current_state))
                .map(|t| t.name.as_str())
                .ok_or_else(|| LifecycleError::NoCancellationAvailable {
                    current_state: current.current_state.clone(),
                })?,
        };
        let next = transition::apply(&definition, Some(&current.current_state), name)?;

        let now = OffsetDateTime::now_utc();
        let mut updated = current.clone();
        updated.current_state = next.to_string();
        updated.updated_at = now;
        updated.state_entered_at = now;
        if let Some(machine) = definition.machine() {
            stamp_milestones(&mut updated, machine, next, now);
        }

        let mut snap = self.storage.begin_snapshot().await?;
        updated.version = self
            .storage
            .update_ticket(&mut snap, updated.clone(), current.version)
            .await?;
        self.audit
            .record(
                &mut snap,
                AuditEntry {
                    ticket_id,
                    item_id: None,
                    transition: Some(name),
                    previous_state: Some(current.current_state.as_str()),
                    new_state: next,
                    actor,
                    notes,
                    at: now,
                },
            )
            .await?;
        self.storage.commit_snapshot(snap).await?;

        tracing::info!(
            transition = name,
            from = %current.current_state,
            to = next,
            %actor,
            "ticket transitioned"
        );
        Ok(TransitionOutcome {
            previous_state: current.current_state,
            current_state: next.to_string(),
            ticket: updated,
        })
    }

    async fn try_forward(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        target: QueueId,
        reason: Option<&str>,
        employee: Option<EmployeeId>,
    ) -> Result<TicketRecord, AttemptError> {
        self.directory.active_tenant(tenant).await?;
        let _ticket = self.ticket_locks.lock(ticket_id).await;
        let current = owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
        let actor = self.actor(tenant, employee).await?;
        let source = current.queue_id;
        if source == target {
            return Err(LifecycleError::invalid_request(format!(
                "ticket {ticket_id} is already in queue {target}"
            ))
            .into());
        }
        let target_queue = self.directory.owned_queue(tenant, target).await?;
        if !target_queue.active {
            return Err(LifecycleError::QueueInactive { queue_id: target }.into());
        }
        if !target_queue.accepts(current.type_definition_id) {
            return Err(LifecycleError::TypeNotAllowed {
                queue_id: target,
                type_definition_id: current.type_definition_id,
            }
            .into());
        }

        let now = OffsetDateTime::now_utc();
        let mut updated = current.clone();
        updated.queue_id = target;
        updated.previous_queue_id = Some(source);
        updated.updated_at = now;

        let guard = self.queues.lock_pair(source, target).await;
        let mut snap = self.storage.begin_snapshot().await?;
        updated.version = self
            .storage
            .update_ticket(&mut snap, updated.clone(), current.version)
            .await?;
        self.queues
            .remove(&mut snap, &guard, source, ticket_id)
            .await?;
        self.queues
            .insert(&mut snap, &guard, target, ticket_id)
            .await?;
        self.audit
            .record_movement(
                &mut snap,
                ticket_id,
                MovementKind::Forwarded {
                    from_queue: source,
                    to_queue: target,
                },
                actor,
                reason,
                now,
            )
            .await?;
        self.storage.commit_snapshot(snap).await?;
        Ok(updated)
    }

    async fn try_reorder(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        position: usize,
        reason: Option<&str>,
        employee: Option<EmployeeId>,
    ) -> Result<TicketRecord, AttemptError> {
        self.directory.active_tenant(tenant).await?;
        // The ticket lock keeps a forward from moving it out of the queue.
        let _ticket = self.ticket_locks.lock(ticket_id).await;
        let current = owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
        let actor = self.actor(tenant, employee).await?;

        let guard = self.queues.lock(current.queue_id).await;
        let mut snap = self.storage.begin_snapshot().await?;
        let (from_position, to_position) = self
            .queues
            .reposition(&mut snap, &guard, current.queue_id, ticket_id, position)
            .await?;
        self.audit
            .record_movement(
                &mut snap,
                ticket_id,
                MovementKind::Repositioned {
                    from_position,
                    to_position,
                },
                actor,
                reason,
                OffsetDateTime::now_utc(),
            )
            .await?;
        self.storage.commit_snapshot(snap).await?;
        Ok(current)
    }

    async fn try_add_item(
        &self,
        tenant: TenantId,
        ticket_id: TicketId,
        id: TicketItemId,
        request: &NewItem,
    ) -> Result<TicketItemRecord, AttemptError> {
        self.directory.active_tenant(tenant).await?;
        let ticket = owned_ticket(self.storage.as_ref(), tenant, ticket_id).await?;
        let ticket_type = self
            .registry
            .load(tenant, ticket.type_definition_id)
            .await?;
        if !ticket_type.accepts_item_type(request.type_definition_id) {
            return Err(LifecycleError::invalid_request(format!(
                "item type {} is not nested under '{}'",
                request.type_definition_id,
                ticket_type.code()
            ))
            .into());
        }
        let item_type = self
            .registry
            .load(tenant, request.type_definition_id)
            .await?;
        if !item_type.is_active() || item_type.kind() != DefinitionKind::Item {
            return Err(LifecycleError::invalid_request(format!(
                "type '{}' cannot be used for new items",
                item_type.code()
            ))
            .into());
        }
        schema::validate(&request.payload, item_type.schema())?;
        let actor = self.actor(tenant, request.created_by).await?;

        let now = OffsetDateTime::now_utc();
        let state = item_type.initial_state();
        let item = TicketItemRecord {
            id,
            seq: 0,
            version: 0,
            ticket_id,
            type_definition_id: request.type_definition_id,
            current_state: state.map(str::to_string),
            payload: request.payload.clone(),
            created_at: now,
            updated_at: now,
            state_entered_at: state.map(|_| now),
        };

        let mut snap = self.storage.begin_snapshot().await?;
        self.storage.insert_item(&mut snap, item.clone()).await?;
        if let Some(state) = state {
            self.audit
                .record(
                    &mut snap,
                    AuditEntry {
                        ticket_id,
                        item_id: Some(id),
                        transition: None,
                        previous_state: None,
                        new_state: state,
                        actor,
                        notes: None,
                        at: now,
                    },
                )
                .await?;
        }
        self.storage.commit_snapshot(snap).await?;
        Ok(item)
    }

    async fn try_transition_item(
        &self,
        tenant: TenantId,
        item_id: TicketItemId,
        name: &str,
        employee: Option<EmployeeId>,
    ) -> Result<ItemTransitionOutcome, AttemptError> {
        self.directory.active_tenant(tenant).await?;
        // An item never changes ticket; lock the ticket, then read the item
        // as it is now.
        let ticket_id = self.storage.get_item(item_id).await?.ticket_id;
        let _ticket = self.ticket_locks.lock(ticket_id).await;
        let current = self.storage.get_item(item_id).await?;
        owned_ticket(self.storage.as_ref(), tenant, current.ticket_id).await?;
        let actor = self.actor(tenant, employee).await?;
        let definition = self
            .registry
            .load(tenant, current.type_definition_id)
            .await?;
        let next = transition::apply(&definition, current.current_state.as_deref(), name)?;
        let previous = current.current_state.clone().unwrap_or_default();

        let now = OffsetDateTime::now_utc();
        let mut updated = current.clone();
        updated.current_state = Some(next.to_string());
        updated.updated_at = now;
        updated.state_entered_at = Some(now);

        let mut snap = self.storage.begin_snapshot().await?;
        updated.version = self
            .storage
            .update_item(&mut snap, updated.clone(), current.version)
            .await?;
        self.audit
            .record(
                &mut snap,
                AuditEntry {
                    ticket_id: current.ticket_id,
                    item_id: Some(item_id),
                    transition: Some(name),
                    previous_state: Some(previous.as_str()),
                    new_state: next,
                    actor,
                    notes: None,
                    at: now,
                },
            )
            .await?;
        self.storage.commit_snapshot(snap).await?;
        Ok(ItemTransitionOutcome {
            item: updated,
            previous_state: previous,
            current_state: next.to_string(),
        })
    }

    async fn actor(
        &self,
        tenant: TenantId,
        employee: Option<EmployeeId>,
    ) -> Result<Actor, AttemptError> {
        match employee {
            Some(id) => {
                self.directory.acting_employee(tenant, id).await?;
                Ok(Actor::Employee(id))
            }
            None => Ok(Actor::System),
        }
    }
}

/// Stamp the lifecycle timestamp of every milestone `state` is designated as.
fn stamp_milestones(
    ticket: &mut TicketRecord,
    machine: &StateMachine,
    state: &str,
    at: OffsetDateTime,
) {
    for milestone in machine.milestones_of(state) {
        let slot = match milestone {
            Milestone::Ready => &mut ticket.ready_at,
            Milestone::Completed => &mut ticket.completed_at,
            Milestone::Cancelled => &mut ticket.cancelled_at,
        };
        *slot = Some(at);
    }
}
