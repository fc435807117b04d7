pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{
    EmployeeRecord, MovementKind, MovementRecord, QueueRecord, TenantRecord, TicketItemRecord,
    TicketRecord, TransitionRecord, TypeDefinitionRecord,
};
pub use traits::TicketStorage;
