//! Compiled Type Definitions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::document::{DefinitionKind, TypeDefinitionDocument};
use crate::error::DefinitionError;
use crate::ids::{TenantId, TypeDefinitionId};
use crate::machine::StateMachine;
use crate::schema::StructuralSchema;

/// Who can see a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "tenant_id", rename_all = "snake_case")]
pub enum DefinitionScope {
    /// Owned by one tenant; invisible to every other tenant.
    Tenant(TenantId),
    /// Tenant-agnostic; visible to all tenants.
    System,
}

impl DefinitionScope {
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            DefinitionScope::Tenant(id) => Some(*id),
            DefinitionScope::System => None,
        }
    }
}

/// Bookkeeping carried alongside a document in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefinitionMeta {
    pub id: TypeDefinitionId,
    pub scope: DefinitionScope,
    pub version: i64,
    pub active: bool,
}

/// A ticket or item kind, parsed and checked.
///
/// Built once per load by [`TypeDefinition::compile`]; request paths only
/// ever consult this form, never the raw document.
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    meta: DefinitionMeta,
    code: String,
    name: String,
    kind: DefinitionKind,
    machine: Option<StateMachine>,
    schema: Option<StructuralSchema>,
    nested_item_types: BTreeSet<TypeDefinitionId>,
    document: TypeDefinitionDocument,
}

impl TypeDefinition {
    pub fn compile(
        meta: DefinitionMeta,
        document: TypeDefinitionDocument,
    ) -> Result<Self, DefinitionError> {
        if document.type_code.trim().is_empty() {
            return Err(DefinitionError::EmptyTypeCode);
        }

        let machine = match (&document.state_machine, document.kind) {
            (Some(doc), _) => Some(StateMachine::compile(doc)?),
            (None, DefinitionKind::Item) => None,
            (None, DefinitionKind::Ticket) => {
                return Err(DefinitionError::MissingStateMachine {
                    type_code: document.type_code.clone(),
                })
            }
        };

        let schema = document
            .structural_schema
            .clone()
            .map(StructuralSchema::compile)
            .transpose()?;

        Ok(TypeDefinition {
            meta,
            code: document.type_code.clone(),
            name: document.type_name.clone(),
            kind: document.kind,
            machine,
            schema,
            nested_item_types: document.nested_item_type_ids.iter().copied().collect(),
            document,
        })
    }

    pub fn id(&self) -> TypeDefinitionId {
        self.meta.id
    }

    pub fn scope(&self) -> DefinitionScope {
        self.meta.scope
    }

    pub fn version(&self) -> i64 {
        self.meta.version
    }

    pub fn is_active(&self) -> bool {
        self.meta.active
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    pub fn machine(&self) -> Option<&StateMachine> {
        self.machine.as_ref()
    }

    pub fn schema(&self) -> Option<&StructuralSchema> {
        self.schema.as_ref()
    }

    pub fn document(&self) -> &TypeDefinitionDocument {
        &self.document
    }

    pub fn initial_state(&self) -> Option<&str> {
        self.machine.as_ref().map(StateMachine::initial_state)
    }

    /// Whether `state` is legal for this type. A type without a state
    /// machine has exactly one legal state: none.
    pub fn is_legal_state(&self, state: Option<&str>) -> bool {
        match (&self.machine, state) {
            (Some(m), Some(s)) => m.has_state(s),
            (None, None) => true,
            _ => false,
        }
    }

    pub fn nested_item_types(&self) -> &BTreeSet<TypeDefinitionId> {
        &self.nested_item_types
    }

    pub fn accepts_item_type(&self, item_type: TypeDefinitionId) -> bool {
        self.nested_item_types.contains(&item_type)
    }

    /// System definitions are visible to every tenant; tenant definitions
    /// only to their owner.
    pub fn visible_to(&self, tenant: TenantId) -> bool {
        match self.meta.scope {
            DefinitionScope::System => true,
            DefinitionScope::Tenant(owner) => owner == tenant,
        }
    }
}
