//! Queue Membership Index.
//!
//! Each queue's ordering is guarded by its own async mutex. Mutations are
//! staged into the caller's snapshot while the caller holds the lock for
//! that queue (see [`QueueMembershipIndex::lock`]), and the lock is kept
//! until the snapshot commits. Queues never share a lock; two queues are
//! always locked in id order.

use std::sync::Arc;

use time::OffsetDateTime;

use ticketflow_core::{QueueId, TenantId, TicketId};
use ticketflow_storage::{StorageError, TicketRecord, TicketStorage};

use crate::audit::owned_ticket;
use crate::config::QueueConfig;
use crate::error::{AttemptError, LifecycleError};
use crate::locks::{KeyGuard, KeyedLocks};
use crate::retry::RetryPolicy;

/// Filters for [`QueueMembershipIndex::list`]. Results keep queue order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueQuery {
    /// Only tickets currently in one of these states. Empty = any state.
    pub states: Vec<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<OffsetDateTime>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<OffsetDateTime>,
    /// Defaults to, and is capped at, the configured page sizes.
    pub limit: Option<usize>,
    pub offset: usize,
}

impl QueueQuery {
    pub fn by_states<I, T>(states: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            states: states.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn matches(&self, ticket: &TicketRecord) -> bool {
        (self.states.is_empty() || self.states.iter().any(|s| *s == ticket.current_state))
            && self.created_after.map_or(true, |t| ticket.created_at >= t)
            && self.created_before.map_or(true, |t| ticket.created_at < t)
    }
}

/// Held while staging and committing ordering changes for one or two queues.
#[must_use]
pub struct QueueGuard {
    _guards: Vec<KeyGuard<QueueId>>,
}

pub struct QueueMembershipIndex<S: TicketStorage> {
    storage: Arc<S>,
    locks: KeyedLocks<QueueId>,
    config: QueueConfig,
    retry: RetryPolicy,
}

impl<S: TicketStorage> QueueMembershipIndex<S> {
    pub(crate) fn new(
        storage: Arc<S>,
        locks: KeyedLocks<QueueId>,
        config: QueueConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            locks,
            config,
            retry,
        }
    }

    /// Serialize ordering changes on `queue`. Queue configuration changes
    /// take the same lock.
    pub async fn lock(&self, queue: QueueId) -> QueueGuard {
        QueueGuard {
            _guards: vec![self.locks.lock(queue).await],
        }
    }

    /// Lock two queues in id order. Locking the same queue twice takes it once.
    pub async fn lock_pair(&self, a: QueueId, b: QueueId) -> QueueGuard {
        QueueGuard {
            _guards: self.locks.lock_pair(a, b).await,
        }
    }

    // ── Staged mutations (caller holds the queue's guard) ────────────────

    /// Place `ticket` at the tail of `queue`.
    pub async fn insert(
        &self,
        snapshot: &mut S::Snapshot,
        _guard: &QueueGuard,
        queue: QueueId,
        ticket: TicketId,
    ) -> Result<(), StorageError> {
        self.storage.queue_push_back(snapshot, queue, ticket).await
    }

    pub async fn remove(
        &self,
        snapshot: &mut S::Snapshot,
        _guard: &QueueGuard,
        queue: QueueId,
        ticket: TicketId,
    ) -> Result<(), StorageError> {
        self.storage.queue_remove(snapshot, queue, ticket).await
    }

    /// Move `ticket` to `position` (0-based, clamped to the tail). Returns
    /// the `(from, to)` positions actually applied.
    pub async fn reposition(
        &self,
        snapshot: &mut S::Snapshot,
        _guard: &QueueGuard,
        queue: QueueId,
        ticket: TicketId,
        position: usize,
    ) -> Result<(usize, usize), StorageError> {
        let from = self
            .storage
            .queue_position(queue, ticket)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                kind: "queue membership",
                id: ticket.to_string(),
            })?;
        let len = self.storage.list_queue_tickets(queue).await?.len();
        let to = position.min(len.saturating_sub(1));
        self.storage
            .queue_reposition(snapshot, queue, ticket, to)
            .await?;
        Ok((from, to))
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Tickets in `queue` matching `query`, in queue order.
    pub async fn list(
        &self,
        tenant: TenantId,
        queue: QueueId,
        query: &QueueQuery,
    ) -> Result<Vec<TicketRecord>, LifecycleError> {
        let limit = query
            .limit
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size);
        self.retry
            .run("list_queue", move || async move {
                Ok(self
                    .members(tenant, queue)
                    .await?
                    .into_iter()
                    .filter(|t| query.matches(t))
                    .skip(query.offset)
                    .take(limit)
                    .collect())
            })
            .await
    }

    /// `listByState`: tickets in any of `states`, paginated.
    pub async fn list_by_state(
        &self,
        tenant: TenantId,
        queue: QueueId,
        states: &[&str],
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<TicketRecord>, LifecycleError> {
        let query = QueueQuery {
            limit,
            offset,
            ..QueueQuery::by_states(states.iter().copied())
        };
        self.list(tenant, queue, &query).await
    }

    /// Number of tickets in `queue`, optionally only those in `state`.
    pub async fn count(
        &self,
        tenant: TenantId,
        queue: QueueId,
        state: Option<&str>,
    ) -> Result<usize, LifecycleError> {
        self.retry
            .run("count_queue", move || async move {
                Ok(self
                    .members(tenant, queue)
                    .await?
                    .iter()
                    .filter(|t| state.map_or(true, |s| t.current_state == s))
                    .count())
            })
            .await
    }

    /// A ticket's 0-based position in its current queue.
    pub async fn position(&self, tenant: TenantId, ticket: TicketId) -> Result<usize, LifecycleError> {
        self.retry
            .run("queue_position", move || async move {
                let record = owned_ticket(self.storage.as_ref(), tenant, ticket).await?;
                let position = self
                    .storage
                    .queue_position(record.queue_id, ticket)
                    .await?
                    .ok_or_else(|| LifecycleError::not_found("queue membership", ticket))?;
                Ok(position)
            })
            .await
    }

    async fn members(&self, tenant: TenantId, queue: QueueId) -> Result<Vec<TicketRecord>, AttemptError> {
        let record = self.storage.get_queue(queue).await?;
        if record.tenant_id != tenant {
            return Err(LifecycleError::tenant_mismatch(tenant, record.tenant_id, "queue", queue).into());
        }
        Ok(self.storage.list_queue_tickets(queue).await?)
    }
}
