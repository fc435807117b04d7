//! Typed identifiers.
//!
//! Every entity is addressed externally by a UUIDv7: globally unique and
//! ordered by creation time, so identifiers can be shared with other systems
//! without collision. Each entity kind gets its own newtype so a `QueueId`
//! can never be passed where a `TicketId` is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// An isolated configuration boundary.
    TenantId
);
define_id!(QueueId);
define_id!(EmployeeId);
define_id!(
    /// A person a ticket is raised for. Persons live outside the engine.
    PersonId
);
define_id!(TypeDefinitionId);
define_id!(TicketId);
define_id!(TicketItemId);
define_id!(TransitionRecordId);
define_id!(MovementRecordId);

/// Who caused a recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// The engine itself, or a caller acting without a staff identity.
    System,
    Employee(EmployeeId),
}

impl Actor {
    pub fn from_employee(employee: Option<EmployeeId>) -> Self {
        employee.map(Actor::Employee).unwrap_or(Actor::System)
    }

    pub fn employee_id(&self) -> Option<EmployeeId> {
        match self {
            Actor::System => None,
            Actor::Employee(id) => Some(*id),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("system"),
            Actor::Employee(id) => write!(f, "employee:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_creation_ordered() {
        let first = TicketId::new();
        let second = TicketId::new();
        assert!(first < second);
    }

    #[test]
    fn id_serializes_as_bare_uuid_string() {
        let id = QueueId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
        let back: QueueId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn id_parses_from_display_form() {
        let id = TenantId::new();
        let parsed: TenantId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TenantId>().is_err());
    }

    #[test]
    fn actor_display_and_serde() {
        let employee = EmployeeId::new();
        assert_eq!(Actor::System.to_string(), "system");
        assert_eq!(
            Actor::Employee(employee).to_string(),
            format!("employee:{}", employee)
        );
        let json = serde_json::to_value(Actor::Employee(employee)).unwrap();
        assert_eq!(json["kind"], "employee");
        assert_eq!(Actor::from_employee(None), Actor::System);
        assert_eq!(
            Actor::from_employee(Some(employee)).employee_id(),
            Some(employee)
        );
    }
}
