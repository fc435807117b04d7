//! ticketflow-core: type definitions and the pure parts of the ticket lifecycle.
//!
//! Tenants describe their ticket and item kinds as JSON documents. This crate
//! parses a document once into a strongly-typed [`TypeDefinition`] (compiled
//! state machine plus compiled payload schema) and provides the two pure
//! components every lifecycle operation is built on:
//!
//! - [`transition::apply`] -- the transition engine
//! - [`schema::validate`] -- the structural validator
//!
//! Nothing in this crate performs I/O.

pub mod definition;
pub mod document;
pub mod error;
pub mod ids;
pub mod machine;
pub mod schema;
pub mod transition;

// ── Convenience re-exports ───────────────────────────────────────────

pub use definition::{DefinitionMeta, DefinitionScope, TypeDefinition};
pub use document::{
    DefinitionKind, MilestonesDocument, StateMachineDocument, TransitionDocument,
    TypeDefinitionDocument,
};
pub use error::{DefinitionError, TransitionError, ValidationError};
pub use ids::{
    Actor, EmployeeId, MovementRecordId, PersonId, QueueId, TenantId, TicketId, TicketItemId,
    TransitionRecordId, TypeDefinitionId,
};
pub use machine::{Milestone, StateMachine, TransitionDef};
pub use schema::StructuralSchema;
pub use transition::{ReplayError, ReplayStep};
