//! The engine's error taxonomy.
//!
//! [`LifecycleError`] is what callers see. Internally every unit of work
//! returns [`AttemptError`], which keeps storage failures apart from rule
//! violations so the retry loop can tell "try again" from "final answer".

use ticketflow_core::{
    DefinitionError, QueueId, TenantId, TransitionError, TypeDefinitionId, ValidationError,
};
use ticketflow_storage::StorageError;

/// Target for security-relevant events (tenant mismatches).
pub const SECURITY_TARGET: &str = "ticketflow::security";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("validation failed: {0}")]
    Validation(ValidationError),

    #[error(
        "transition '{transition}' is not available from state '{current_state}' (valid: [{}])",
        .valid_transitions.join(", ")
    )]
    InvalidTransition {
        transition: String,
        current_state: String,
        valid_transitions: Vec<String>,
    },

    #[error("unknown transition '{transition}'")]
    UnknownTransition { transition: String },

    #[error("queue {queue_id} is inactive")]
    QueueInactive { queue_id: QueueId },

    #[error("queue {queue_id} does not accept type {type_definition_id}")]
    TypeNotAllowed {
        queue_id: QueueId,
        type_definition_id: TypeDefinitionId,
    },

    #[error("no cancellation transition from state '{current_state}'")]
    NoCancellationAvailable { current_state: String },

    #[error("invalid type definition: {0}")]
    InvalidDefinition(DefinitionError),

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Writers outside this engine kept changing the same record until the
    /// retry budget ran out. Nothing was written; the request may be sent
    /// again.
    #[error("{operation} gave up after repeated concurrent updates")]
    Contended { operation: &'static str },

    /// Storage or infrastructure failure. Details are logged, never returned.
    #[error("internal error during {operation}")]
    Internal { operation: &'static str },
}

impl LifecycleError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LifecycleError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        LifecycleError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// A caller touched a resource owned by another tenant. Logged on
    /// [`SECURITY_TARGET`] so it is never confused with a plain miss.
    pub(crate) fn tenant_mismatch(
        caller: TenantId,
        owner: TenantId,
        kind: &'static str,
        id: impl ToString,
    ) -> Self {
        let id = id.to_string();
        tracing::warn!(
            target: SECURITY_TARGET,
            caller_tenant = %caller,
            owner_tenant = %owner,
            resource_kind = kind,
            resource_id = %id,
            "cross-tenant access rejected"
        );
        LifecycleError::Forbidden {
            reason: format!("{kind} {id} belongs to another tenant"),
        }
    }

    /// Whether the error is a business-rule rejection (as opposed to an
    /// infrastructure failure or contention).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            LifecycleError::Internal { .. } | LifecycleError::Contended { .. }
        )
    }
}

impl From<TransitionError> for LifecycleError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::UnknownTransition { transition } => {
                LifecycleError::UnknownTransition { transition }
            }
            TransitionError::InvalidTransition {
                transition,
                current_state,
                valid_transitions,
            } => LifecycleError::InvalidTransition {
                transition,
                current_state,
                valid_transitions,
            },
        }
    }
}

impl From<ValidationError> for LifecycleError {
    fn from(err: ValidationError) -> Self {
        LifecycleError::Validation(err)
    }
}

impl From<DefinitionError> for LifecycleError {
    fn from(err: DefinitionError) -> Self {
        LifecycleError::InvalidDefinition(err)
    }
}

/// Failure of a single attempt at a unit of work.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Final: returned to the caller as is.
    Rejected(LifecycleError),
    /// Possibly retryable, mapped by [`crate::retry::RetryPolicy::run`].
    Storage(StorageError),
}

impl From<LifecycleError> for AttemptError {
    fn from(err: LifecycleError) -> Self {
        AttemptError::Rejected(err)
    }
}

impl From<StorageError> for AttemptError {
    fn from(err: StorageError) -> Self {
        AttemptError::Storage(err)
    }
}

impl From<TransitionError> for AttemptError {
    fn from(err: TransitionError) -> Self {
        AttemptError::Rejected(err.into())
    }
}

impl From<ValidationError> for AttemptError {
    fn from(err: ValidationError) -> Self {
        AttemptError::Rejected(err.into())
    }
}

impl From<DefinitionError> for AttemptError {
    fn from(err: DefinitionError) -> Self {
        AttemptError::Rejected(err.into())
    }
}

/// Map a storage error that will not be retried onto the public taxonomy.
pub(crate) fn from_storage(operation: &'static str, err: StorageError) -> LifecycleError {
    match err {
        StorageError::NotFound { kind, id } => {
            tracing::debug!(operation, kind, %id, "not found");
            LifecycleError::NotFound { kind, id }
        }
        StorageError::DuplicateKey { kind, key } => {
            LifecycleError::invalid_request(format!("duplicate {kind} '{key}'"))
        }
        StorageError::ConcurrentConflict { kind, id, .. } => {
            tracing::warn!(operation, kind, %id, "conflicts outlasted the retry budget");
            LifecycleError::Contended { operation }
        }
        err => {
            tracing::error!(operation, error = %err, "storage failure");
            LifecycleError::Internal { operation }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_errors_keep_their_detail() {
        let err: LifecycleError = TransitionError::InvalidTransition {
            transition: "t2".into(),
            current_state: "A".into(),
            valid_transitions: vec!["t1".into()],
        }
        .into();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                transition: "t2".into(),
                current_state: "A".into(),
                valid_transitions: vec!["t1".into()],
            }
        );
        assert!(err.to_string().contains("valid: [t1]"));
    }

    #[test]
    fn storage_internals_do_not_leak() {
        let err = from_storage(
            "transition_ticket",
            StorageError::Backend("connection reset by 10.0.0.7".into()),
        );
        assert_eq!(
            err,
            LifecycleError::Internal {
                operation: "transition_ticket"
            }
        );
        assert!(!err.to_string().contains("10.0.0.7"));
    }

    #[test]
    fn storage_not_found_keeps_kind() {
        let err = from_storage(
            "get_ticket",
            StorageError::NotFound {
                kind: "ticket",
                id: "x".into(),
            },
        );
        assert!(matches!(err, LifecycleError::NotFound { kind: "ticket", .. }));
    }
}
