/// All errors that can be returned by a TicketStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No record of `kind` with this identifier.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record of `kind` with this identifier (or membership) already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// Optimistic concurrency control conflict: another snapshot committed a
    /// change to the record first. The expected version was not found.
    #[error("concurrent conflict on {kind} {id}: expected version {expected_version}")]
    ConcurrentConflict {
        kind: &'static str,
        id: String,
        expected_version: i64,
    },

    /// A uniqueness constraint other than the primary key was violated.
    #[error("duplicate {kind}: {key}")]
    DuplicateKey { kind: &'static str, key: String },

    /// The backend is temporarily unable to serve the request; retrying may succeed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the same request may succeed if simply tried again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConcurrentConflict { .. })
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: &'static str, id: impl ToString) -> Self {
        StorageError::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }
}
