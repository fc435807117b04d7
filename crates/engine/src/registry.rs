//! Schema Registry: stores Type Definitions and serves them compiled.
//!
//! Documents are compiled once, when registered or first loaded, and the
//! compiled form is cached by id. The cache only ever moves forward: an
//! entry is replaced only by a definition with a higher version, and every
//! update writes its new version through, so a slow reader can never
//! reinstate a stale definition.

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;

use ticketflow_core::{
    DefinitionKind, DefinitionMeta, DefinitionScope, TenantId, TypeDefinition,
    TypeDefinitionDocument, TypeDefinitionId,
};
use ticketflow_storage::{TicketStorage, TypeDefinitionRecord};

use crate::config::RegistryConfig;
use crate::error::{AttemptError, LifecycleError, SECURITY_TARGET};
use crate::retry::RetryPolicy;

pub struct SchemaRegistry<S: TicketStorage> {
    storage: Arc<S>,
    cache: Option<DashMap<TypeDefinitionId, Arc<TypeDefinition>>>,
    retry: RetryPolicy,
}

impl<S: TicketStorage> SchemaRegistry<S> {
    pub fn new(storage: Arc<S>, config: &RegistryConfig, retry: RetryPolicy) -> Self {
        Self {
            storage,
            cache: config.cache_enabled.then(DashMap::new),
            retry,
        }
    }

    /// Store a new definition under `scope` (a tenant, or the system scope).
    #[tracing::instrument(skip(self, document), fields(type_code = %document.type_code))]
    pub async fn register(
        &self,
        scope: DefinitionScope,
        document: TypeDefinitionDocument,
    ) -> Result<Arc<TypeDefinition>, LifecycleError> {
        let id = TypeDefinitionId::new();
        let definition = self
            .retry
            .run("register_type_definition", || {
                self.try_register(id, scope, document.clone())
            })
            .await?;
        tracing::info!(%id, code = definition.code(), "type definition registered");
        Ok(definition)
    }

    /// Replace a definition's document. `authority` is the caller's scope
    /// and must own the definition.
    ///
    /// Existing tickets must stay legal, so an update may add states but
    /// never drop one, and may not change the definition's kind or whether
    /// it has a state machine.
    #[tracing::instrument(skip(self, document))]
    pub async fn update(
        &self,
        authority: DefinitionScope,
        id: TypeDefinitionId,
        document: TypeDefinitionDocument,
    ) -> Result<Arc<TypeDefinition>, LifecycleError> {
        let definition = self
            .retry
            .run("update_type_definition", || {
                self.try_update(authority, id, document.clone())
            })
            .await?;
        tracing::info!(version = definition.version(), "type definition updated");
        Ok(definition)
    }

    /// Soft-delete: the definition stays resolvable for existing tickets but
    /// no longer admits new ones.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(
        &self,
        authority: DefinitionScope,
        id: TypeDefinitionId,
    ) -> Result<Arc<TypeDefinition>, LifecycleError> {
        self.retry
            .run("deactivate_type_definition", move || {
                self.try_deactivate(authority, id)
            })
            .await
    }

    /// Fetch a definition visible to `tenant`. Definitions owned by another
    /// tenant are reported as not found.
    pub async fn get(
        &self,
        tenant: TenantId,
        id: TypeDefinitionId,
    ) -> Result<Arc<TypeDefinition>, LifecycleError> {
        self.retry
            .run("get_type_definition", move || self.load(tenant, id))
            .await
    }

    /// Every definition visible to `tenant`: its own, then the system ones.
    pub async fn list(&self, tenant: TenantId) -> Result<Vec<Arc<TypeDefinition>>, LifecycleError> {
        self.retry
            .run("list_type_definitions", move || self.try_list(tenant))
            .await
    }

    /// Drop a cached definition so the next read goes to storage.
    pub fn invalidate(&self, id: TypeDefinitionId) {
        if let Some(cache) = &self.cache {
            cache.remove(&id);
        }
    }

    // ── Units of work ────────────────────────────────────────────────────

    pub(crate) async fn load(
        &self,
        tenant: TenantId,
        id: TypeDefinitionId,
    ) -> Result<Arc<TypeDefinition>, AttemptError> {
        let cached = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(&id).map(|entry| Arc::clone(entry.value())));
        let definition = match cached {
            Some(definition) => definition,
            None => {
                let record = self.storage.get_type_definition(id).await?;
                self.remember(compile_stored(&record)?)
            }
        };
        if !definition.visible_to(tenant) {
            tracing::warn!(
                target: SECURITY_TARGET,
                caller_tenant = %tenant,
                type_definition_id = %id,
                "type definition of another tenant requested"
            );
            return Err(LifecycleError::not_found("type definition", id).into());
        }
        Ok(definition)
    }

    async fn try_register(
        &self,
        id: TypeDefinitionId,
        scope: DefinitionScope,
        document: TypeDefinitionDocument,
    ) -> Result<Arc<TypeDefinition>, AttemptError> {
        if let DefinitionScope::Tenant(tenant) = scope {
            let record = self.storage.get_tenant(tenant).await?;
            if !record.active {
                return Err(LifecycleError::Forbidden {
                    reason: format!("tenant {tenant} is inactive"),
                }
                .into());
            }
        }
        let meta = DefinitionMeta {
            id,
            scope,
            version: 0,
            active: true,
        };
        let definition = TypeDefinition::compile(meta, document)?;
        self.check_nested(scope, &definition).await?;

        let now = OffsetDateTime::now_utc();
        let record = TypeDefinitionRecord {
            id,
            seq: 0,
            scope,
            type_code: definition.code().to_string(),
            document: definition.document().to_json(),
            version: 0,
            active: true,
            created_at: now,
            updated_at: now,
        };
        let mut snap = self.storage.begin_snapshot().await?;
        self.storage
            .put_type_definition(&mut snap, record, None)
            .await?;
        self.storage.commit_snapshot(snap).await?;
        Ok(self.remember(definition))
    }

    async fn try_update(
        &self,
        authority: DefinitionScope,
        id: TypeDefinitionId,
        document: TypeDefinitionDocument,
    ) -> Result<Arc<TypeDefinition>, AttemptError> {
        let record = self.storage.get_type_definition(id).await?;
        authorize(authority, &record)?;
        let current = compile_stored(&record)?;

        let meta = DefinitionMeta {
            id,
            scope: record.scope,
            version: record.version + 1,
            active: record.active,
        };
        let replacement = TypeDefinition::compile(meta, document)?;
        check_compatible(&current, &replacement)?;
        self.check_nested(record.scope, &replacement).await?;

        let updated = TypeDefinitionRecord {
            type_code: replacement.code().to_string(),
            document: replacement.document().to_json(),
            updated_at: OffsetDateTime::now_utc(),
            ..record.clone()
        };
        let mut snap = self.storage.begin_snapshot().await?;
        self.storage
            .put_type_definition(&mut snap, updated, Some(record.version))
            .await?;
        self.storage.commit_snapshot(snap).await?;
        Ok(self.remember(replacement))
    }

    async fn try_deactivate(
        &self,
        authority: DefinitionScope,
        id: TypeDefinitionId,
    ) -> Result<Arc<TypeDefinition>, AttemptError> {
        let record = self.storage.get_type_definition(id).await?;
        authorize(authority, &record)?;
        let updated = TypeDefinitionRecord {
            active: false,
            version: record.version + 1,
            updated_at: OffsetDateTime::now_utc(),
            ..record.clone()
        };
        let definition = compile_stored(&updated)?;
        let mut snap = self.storage.begin_snapshot().await?;
        self.storage
            .put_type_definition(&mut snap, updated, Some(record.version))
            .await?;
        self.storage.commit_snapshot(snap).await?;
        Ok(self.remember(definition))
    }

    async fn try_list(&self, tenant: TenantId) -> Result<Vec<Arc<TypeDefinition>>, AttemptError> {
        let mut records = self
            .storage
            .list_type_definitions(DefinitionScope::Tenant(tenant))
            .await?;
        records.extend(
            self.storage
                .list_type_definitions(DefinitionScope::System)
                .await?,
        );
        let mut definitions = Vec::with_capacity(records.len());
        for record in &records {
            definitions.push(self.remember(compile_stored(record)?));
        }
        Ok(definitions)
    }

    /// Nested item types must exist, be visible from `scope`, and be item kinds.
    async fn check_nested(
        &self,
        scope: DefinitionScope,
        definition: &TypeDefinition,
    ) -> Result<(), AttemptError> {
        for nested_id in definition.nested_item_types() {
            let nested = match scope {
                DefinitionScope::Tenant(tenant) => self.load(tenant, *nested_id).await?,
                DefinitionScope::System => {
                    let record = self.storage.get_type_definition(*nested_id).await?;
                    if record.scope != DefinitionScope::System {
                        return Err(LifecycleError::invalid_request(format!(
                            "system definitions may only nest system item types, {nested_id} is tenant-owned"
                        ))
                        .into());
                    }
                    self.remember(compile_stored(&record)?)
                }
            };
            if nested.kind() != DefinitionKind::Item {
                return Err(LifecycleError::invalid_request(format!(
                    "nested type '{}' is not an item type",
                    nested.code()
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Cache `definition` unless a newer version is already cached.
    fn remember(&self, definition: TypeDefinition) -> Arc<TypeDefinition> {
        let definition = Arc::new(definition);
        let Some(cache) = &self.cache else {
            return definition;
        };
        let mut entry = cache
            .entry(definition.id())
            .or_insert_with(|| Arc::clone(&definition));
        if entry.version() < definition.version() {
            *entry = Arc::clone(&definition);
        }
        definition
    }
}

fn compile_stored(record: &TypeDefinitionRecord) -> Result<TypeDefinition, LifecycleError> {
    let meta = DefinitionMeta {
        id: record.id,
        scope: record.scope,
        version: record.version,
        active: record.active,
    };
    TypeDefinitionDocument::from_json(&record.document)
        .and_then(|document| TypeDefinition::compile(meta, document))
        .map_err(|err| {
            tracing::error!(id = %record.id, error = %err, "stored type definition does not compile");
            LifecycleError::Internal {
                operation: "load_type_definition",
            }
        })
}

fn authorize(authority: DefinitionScope, record: &TypeDefinitionRecord) -> Result<(), LifecycleError> {
    match (authority, record.scope) {
        (a, b) if a == b => Ok(()),
        (DefinitionScope::Tenant(caller), DefinitionScope::Tenant(owner)) => Err(
            LifecycleError::tenant_mismatch(caller, owner, "type definition", record.id),
        ),
        (DefinitionScope::Tenant(_), DefinitionScope::System) => Err(LifecycleError::Forbidden {
            reason: format!("type definition {} is system-owned", record.id),
        }),
        (DefinitionScope::System, _) => Err(LifecycleError::Forbidden {
            reason: format!("type definition {} is tenant-owned", record.id),
        }),
    }
}

fn check_compatible(current: &TypeDefinition, replacement: &TypeDefinition) -> Result<(), LifecycleError> {
    if current.kind() != replacement.kind() {
        return Err(LifecycleError::invalid_request(
            "an update may not change the definition kind",
        ));
    }
    match (current.machine(), replacement.machine()) {
        (None, None) => Ok(()),
        (Some(old), Some(new)) => match old.states().iter().find(|s| !new.has_state(s)) {
            Some(dropped) => Err(LifecycleError::invalid_request(format!(
                "state '{dropped}' may still be in use and cannot be removed"
            ))),
            None => Ok(()),
        },
        _ => Err(LifecycleError::invalid_request(
            "an update may not add or remove the state machine",
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use ticketflow_storage::{MemoryStorage, TenantRecord};

    use super::*;
    use crate::config::RetryConfig;

    async fn setup(cache_enabled: bool) -> (Arc<MemoryStorage>, SchemaRegistry<MemoryStorage>, TenantId) {
        let storage = Arc::new(MemoryStorage::new());
        let tenant = TenantRecord {
            id: TenantId::new(),
            seq: 0,
            name: "acme".into(),
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        let tenant_id = tenant.id;
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage.put_tenant(&mut snap, tenant).await.unwrap();
        storage.commit_snapshot(snap).await.unwrap();
        let registry = SchemaRegistry::new(
            Arc::clone(&storage),
            &RegistryConfig { cache_enabled },
            RetryPolicy::new(&RetryConfig::default()),
        );
        (storage, registry, tenant_id)
    }

    fn doc(code: &str, states: &[&str]) -> TypeDefinitionDocument {
        TypeDefinitionDocument::from_json(&json!({
            "typeCode": code,
            "typeName": code,
            "stateMachine": {
                "initialState": states[0],
                "states": states,
                "transitions": [{ "name": "go", "from": states[0], "to": states[states.len() - 1] }]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn update_is_visible_immediately() {
        for cache_enabled in [true, false] {
            let (_, registry, tenant) = setup(cache_enabled).await;
            let scope = DefinitionScope::Tenant(tenant);
            let v0 = registry.register(scope, doc("order", &["a", "b"])).await.unwrap();
            registry.get(tenant, v0.id()).await.unwrap();

            registry
                .update(scope, v0.id(), doc("order", &["a", "b", "c"]))
                .await
                .unwrap();
            let fresh = registry.get(tenant, v0.id()).await.unwrap();
            assert_eq!(fresh.version(), 1);
            assert!(fresh.machine().unwrap().has_state("c"));
        }
    }

    #[tokio::test]
    async fn other_tenants_definitions_are_not_found() {
        let (storage, registry, tenant) = setup(true).await;
        let def = registry
            .register(DefinitionScope::Tenant(tenant), doc("order", &["a", "b"]))
            .await
            .unwrap();

        let other = TenantRecord {
            id: TenantId::new(),
            seq: 0,
            name: "globex".into(),
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        let other_id = other.id;
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage.put_tenant(&mut snap, other).await.unwrap();
        storage.commit_snapshot(snap).await.unwrap();

        let err = registry.get(other_id, def.id()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound { kind: "type definition", .. }));
    }

    #[tokio::test]
    async fn system_definitions_are_visible_to_every_tenant() {
        let (_, registry, tenant) = setup(true).await;
        let def = registry
            .register(DefinitionScope::System, doc("generic", &["open", "closed"]))
            .await
            .unwrap();
        assert!(registry.get(tenant, def.id()).await.is_ok());
        assert!(registry.get(TenantId::new(), def.id()).await.is_ok());
        let listed = registry.list(tenant).await.unwrap();
        assert_eq!(listed.len(), 1);

        let err = registry
            .update(DefinitionScope::Tenant(tenant), def.id(), doc("generic", &["open", "closed"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn updates_may_not_drop_states() {
        let (_, registry, tenant) = setup(true).await;
        let scope = DefinitionScope::Tenant(tenant);
        let def = registry
            .register(scope, doc("order", &["a", "b", "c"]))
            .await
            .unwrap();
        let err = registry
            .update(scope, def.id(), doc("order", &["a", "c"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn malformed_definitions_are_rejected_at_registration() {
        let (_, registry, tenant) = setup(true).await;
        let bad = TypeDefinitionDocument::from_json(&json!({
            "typeCode": "broken",
            "typeName": "Broken",
            "stateMachine": {
                "initialState": "nowhere",
                "states": ["a"],
                "transitions": []
            }
        }))
        .unwrap();
        let err = registry
            .register(DefinitionScope::Tenant(tenant), bad)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidDefinition(_)));
        assert!(registry.list(tenant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected_per_tenant() {
        let (_, registry, tenant) = setup(true).await;
        let scope = DefinitionScope::Tenant(tenant);
        registry.register(scope, doc("order", &["a", "b"])).await.unwrap();
        let err = registry
            .register(scope, doc("order", &["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn deactivated_definitions_stay_resolvable() {
        let (_, registry, tenant) = setup(false).await;
        let scope = DefinitionScope::Tenant(tenant);
        let def = registry.register(scope, doc("order", &["a", "b"])).await.unwrap();
        registry.deactivate(scope, def.id()).await.unwrap();
        let fetched = registry.get(tenant, def.id()).await.unwrap();
        assert!(!fetched.is_active());
    }
}
