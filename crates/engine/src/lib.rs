//! ticketflow-engine: the multi-tenant ticket lifecycle engine.
//!
//! The engine wires the stateful components around a [`TicketStorage`]
//! backend:
//!
//! - [`SchemaRegistry`] -- tenant and system Type Definitions, compiled and cached
//! - [`TenantDirectory`] -- tenants, queues, and employees
//! - [`LifecycleManager`] -- ticket and item creation, transitions, movement
//! - [`AuditRecorder`] -- append-only transition and movement history
//! - [`QueueMembershipIndex`] -- per-queue ordering and queue queries
//!
//! Every operation takes the caller's tenant explicitly. Errors surface as
//! [`LifecycleError`]; storage internals never leak through it.

pub mod audit;
pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
mod locks;
pub mod queue_index;
pub mod registry;
pub mod retry;
pub mod telemetry;

use std::sync::Arc;

use ticketflow_storage::{MemoryStorage, TicketStorage};

use crate::locks::KeyedLocks;

// ── Convenience re-exports ───────────────────────────────────────────

pub use audit::{AuditEntry, AuditRecorder};
pub use config::{ConfigError, EngineConfig, QueueConfig, RegistryConfig, RetryConfig, TicketConfig};
pub use directory::TenantDirectory;
pub use error::{LifecycleError, SECURITY_TARGET};
pub use lifecycle::{ItemTransitionOutcome, LifecycleManager, NewItem, NewTicket, TransitionOutcome};
pub use queue_index::{QueueGuard, QueueMembershipIndex, QueueQuery};
pub use registry::SchemaRegistry;
pub use retry::RetryPolicy;

/// All engine components over one shared storage backend.
pub struct Engine<S: TicketStorage> {
    storage: Arc<S>,
    registry: Arc<SchemaRegistry<S>>,
    directory: Arc<TenantDirectory<S>>,
    audit: Arc<AuditRecorder<S>>,
    queues: Arc<QueueMembershipIndex<S>>,
    lifecycle: LifecycleManager<S>,
    config: EngineConfig,
}

impl<S: TicketStorage> Engine<S> {
    pub fn new(storage: Arc<S>, config: EngineConfig) -> Self {
        let retry = RetryPolicy::new(&config.retry);
        let registry = Arc::new(SchemaRegistry::new(
            Arc::clone(&storage),
            &config.registry,
            retry,
        ));
        let queue_locks = KeyedLocks::default();
        let directory = Arc::new(TenantDirectory::new(
            Arc::clone(&storage),
            Arc::clone(&registry),
            queue_locks.clone(),
            retry,
        ));
        let audit = Arc::new(AuditRecorder::new(Arc::clone(&storage), retry));
        let queues = Arc::new(QueueMembershipIndex::new(
            Arc::clone(&storage),
            queue_locks,
            config.queue.clone(),
            retry,
        ));
        let lifecycle = LifecycleManager::new(
            Arc::clone(&storage),
            Arc::clone(&registry),
            Arc::clone(&directory),
            Arc::clone(&audit),
            Arc::clone(&queues),
            config.tickets.clone(),
            retry,
        );
        Self {
            storage,
            registry,
            directory,
            audit,
            queues,
            lifecycle,
            config,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry<S> {
        &self.registry
    }

    pub fn directory(&self) -> &TenantDirectory<S> {
        &self.directory
    }

    pub fn lifecycle(&self) -> &LifecycleManager<S> {
        &self.lifecycle
    }

    pub fn audit(&self) -> &AuditRecorder<S> {
        &self.audit
    }

    pub fn queues(&self) -> &QueueMembershipIndex<S> {
        &self.queues
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Engine<MemoryStorage> {
    /// An engine over a fresh in-memory backend.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(MemoryStorage::new()), config)
    }
}
