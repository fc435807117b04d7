//! Tenants, queues, and employees: the configuration plane the lifecycle
//! depends on. Nothing here is ever deleted; records are deactivated.

use std::sync::Arc;

use time::OffsetDateTime;

use ticketflow_core::{EmployeeId, QueueId, TenantId, TypeDefinitionId};
use ticketflow_storage::{EmployeeRecord, QueueRecord, TenantRecord, TicketStorage};

use crate::error::{AttemptError, LifecycleError};
use crate::locks::KeyedLocks;
use crate::registry::SchemaRegistry;
use crate::retry::RetryPolicy;

pub struct TenantDirectory<S: TicketStorage> {
    storage: Arc<S>,
    registry: Arc<SchemaRegistry<S>>,
    /// Shared with the queue index: a queue's configuration never changes
    /// while a ticket is being placed in it.
    queue_locks: KeyedLocks<QueueId>,
    retry: RetryPolicy,
}

impl<S: TicketStorage> TenantDirectory<S> {
    pub(crate) fn new(
        storage: Arc<S>,
        registry: Arc<SchemaRegistry<S>>,
        queue_locks: KeyedLocks<QueueId>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            registry,
            queue_locks,
            retry,
        }
    }

    // ── Tenants ──────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self))]
    pub async fn create_tenant(&self, name: &str) -> Result<TenantRecord, LifecycleError> {
        let record = TenantRecord {
            id: TenantId::new(),
            seq: 0,
            name: name.to_string(),
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.retry
            .run("create_tenant", || async {
                let mut snap = self.storage.begin_snapshot().await?;
                self.storage.put_tenant(&mut snap, record.clone()).await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(())
            })
            .await?;
        tracing::info!(tenant_id = %record.id, "tenant created");
        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_tenant_active(
        &self,
        tenant: TenantId,
        active: bool,
    ) -> Result<TenantRecord, LifecycleError> {
        self.retry
            .run("set_tenant_active", move || async move {
                let mut record = self.storage.get_tenant(tenant).await?;
                record.active = active;
                let mut snap = self.storage.begin_snapshot().await?;
                self.storage.put_tenant(&mut snap, record.clone()).await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(record)
            })
            .await
    }

    pub async fn get_tenant(&self, tenant: TenantId) -> Result<TenantRecord, LifecycleError> {
        self.retry
            .run("get_tenant", move || async move {
                Ok(self.storage.get_tenant(tenant).await?)
            })
            .await
    }

    // ── Queues ───────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, accepted_type_ids))]
    pub async fn create_queue(
        &self,
        tenant: TenantId,
        name: &str,
        accepted_type_ids: Vec<TypeDefinitionId>,
    ) -> Result<QueueRecord, LifecycleError> {
        let now = OffsetDateTime::now_utc();
        let record = QueueRecord {
            id: QueueId::new(),
            seq: 0,
            tenant_id: tenant,
            name: name.to_string(),
            accepted_type_ids,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.retry
            .run("create_queue", || async {
                self.active_tenant(tenant).await?;
                self.check_types_visible(tenant, &record.accepted_type_ids)
                    .await?;
                let mut snap = self.storage.begin_snapshot().await?;
                self.storage.put_queue(&mut snap, record.clone()).await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(())
            })
            .await?;
        tracing::info!(queue_id = %record.id, "queue created");
        Ok(record)
    }

    /// Disabling a queue blocks new tickets only; tickets already in it keep
    /// moving.
    #[tracing::instrument(skip(self))]
    pub async fn set_queue_active(
        &self,
        tenant: TenantId,
        queue: QueueId,
        active: bool,
    ) -> Result<QueueRecord, LifecycleError> {
        self.retry
            .run("set_queue_active", move || async move {
                self.active_tenant(tenant).await?;
                let _guard = self.queue_locks.lock(queue).await;
                let mut record = self.owned_queue(tenant, queue).await?;
                record.active = active;
                record.updated_at = OffsetDateTime::now_utc();
                let mut snap = self.storage.begin_snapshot().await?;
                self.storage.put_queue(&mut snap, record.clone()).await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(record)
            })
            .await
    }

    #[tracing::instrument(skip(self, accepted_type_ids))]
    pub async fn set_queue_accepted_types(
        &self,
        tenant: TenantId,
        queue: QueueId,
        accepted_type_ids: Vec<TypeDefinitionId>,
    ) -> Result<QueueRecord, LifecycleError> {
        self.retry
            .run("set_queue_accepted_types", || async {
                self.active_tenant(tenant).await?;
                self.check_types_visible(tenant, &accepted_type_ids).await?;
                let _guard = self.queue_locks.lock(queue).await;
                let mut record = self.owned_queue(tenant, queue).await?;
                record.accepted_type_ids = accepted_type_ids.clone();
                record.updated_at = OffsetDateTime::now_utc();
                let mut snap = self.storage.begin_snapshot().await?;
                self.storage.put_queue(&mut snap, record.clone()).await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(record)
            })
            .await
    }

    pub async fn get_queue(
        &self,
        tenant: TenantId,
        queue: QueueId,
    ) -> Result<QueueRecord, LifecycleError> {
        self.retry
            .run("get_queue", move || self.owned_queue(tenant, queue))
            .await
    }

    // ── Employees ────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self))]
    pub async fn create_employee(
        &self,
        tenant: TenantId,
        name: &str,
    ) -> Result<EmployeeRecord, LifecycleError> {
        let record = EmployeeRecord {
            id: EmployeeId::new(),
            seq: 0,
            tenant_id: tenant,
            name: name.to_string(),
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        self.retry
            .run("create_employee", || async {
                self.active_tenant(tenant).await?;
                let mut snap = self.storage.begin_snapshot().await?;
                self.storage.put_employee(&mut snap, record.clone()).await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(())
            })
            .await?;
        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_employee_active(
        &self,
        tenant: TenantId,
        employee: EmployeeId,
        active: bool,
    ) -> Result<EmployeeRecord, LifecycleError> {
        self.retry
            .run("set_employee_active", move || async move {
                self.active_tenant(tenant).await?;
                let mut record = self.owned_employee(tenant, employee).await?;
                record.active = active;
                let mut snap = self.storage.begin_snapshot().await?;
                self.storage.put_employee(&mut snap, record.clone()).await?;
                self.storage.commit_snapshot(snap).await?;
                Ok(record)
            })
            .await
    }

    // ── Guards shared with the lifecycle ─────────────────────────────────

    /// The tenant, provided it exists and is active.
    pub(crate) async fn active_tenant(&self, tenant: TenantId) -> Result<TenantRecord, AttemptError> {
        let record = self.storage.get_tenant(tenant).await?;
        if !record.active {
            return Err(LifecycleError::Forbidden {
                reason: format!("tenant {tenant} is inactive"),
            }
            .into());
        }
        Ok(record)
    }

    pub(crate) async fn owned_queue(
        &self,
        tenant: TenantId,
        queue: QueueId,
    ) -> Result<QueueRecord, AttemptError> {
        let record = self.storage.get_queue(queue).await?;
        if record.tenant_id != tenant {
            return Err(LifecycleError::tenant_mismatch(tenant, record.tenant_id, "queue", queue).into());
        }
        Ok(record)
    }

    pub(crate) async fn owned_employee(
        &self,
        tenant: TenantId,
        employee: EmployeeId,
    ) -> Result<EmployeeRecord, AttemptError> {
        let record = self.storage.get_employee(employee).await?;
        if record.tenant_id != tenant {
            return Err(LifecycleError::tenant_mismatch(
                tenant,
                record.tenant_id,
                "employee",
                employee,
            )
            .into());
        }
        Ok(record)
    }

    /// An employee of `tenant` who may act on tickets.
    pub(crate) async fn acting_employee(
        &self,
        tenant: TenantId,
        employee: EmployeeId,
    ) -> Result<EmployeeRecord, AttemptError> {
        let record = self.owned_employee(tenant, employee).await?;
        if !record.active {
            return Err(
                LifecycleError::invalid_request(format!("employee {employee} is inactive")).into(),
            );
        }
        Ok(record)
    }

    async fn check_types_visible(
        &self,
        tenant: TenantId,
        type_ids: &[TypeDefinitionId],
    ) -> Result<(), AttemptError> {
        for id in type_ids {
            self.registry.load(tenant, *id).await?;
        }
        Ok(())
    }
}
