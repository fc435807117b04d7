use serde::{Deserialize, Serialize};

/// A Type Definition document that cannot be loaded.
///
/// All of these are raised when a definition is registered or updated,
/// never when a ticket transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    /// The document is not valid JSON for the expected shape.
    #[error("malformed type definition document: {0}")]
    Malformed(String),

    #[error("typeCode must not be empty")]
    EmptyTypeCode,

    /// Ticket kinds need a state machine; only item kinds may omit it.
    #[error("type '{type_code}' is a ticket type and must declare a state machine")]
    MissingStateMachine { type_code: String },

    #[error("state '{state}' is declared more than once")]
    DuplicateState { state: String },

    #[error("initial state '{initial}' is not declared in states: [{}]", .states.join(", "))]
    UnknownInitialState { initial: String, states: Vec<String> },

    #[error("transition names must not be empty")]
    EmptyTransitionName,

    #[error("transition '{transition}' references undeclared state '{state}'")]
    UnknownTransitionState { transition: String, state: String },

    /// Two transitions share a name and a "from" state.
    #[error("transition '{transition}' is declared more than once from state '{from}'")]
    AmbiguousTransition { transition: String, from: String },

    #[error("milestone '{milestone}' references undeclared state '{state}'")]
    UnknownMilestoneState { milestone: String, state: String },

    /// The structural schema does not compile.
    #[error("invalid structural schema: {reason}")]
    InvalidSchema { reason: String },
}

/// A transition request the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum TransitionError {
    /// No transition of this name exists anywhere in the machine.
    #[error("unknown transition '{transition}'")]
    UnknownTransition { transition: String },

    /// The transition exists, but not from the current state.
    #[error(
        "transition '{transition}' is not available from state '{current_state}' (valid: [{}])",
        .valid_transitions.join(", ")
    )]
    InvalidTransition {
        transition: String,
        current_state: String,
        valid_transitions: Vec<String>,
    },
}

/// A payload that does not match its type's structural schema.
///
/// `field_path` is a JSON Pointer to the offending value; an empty path
/// refers to the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{reason} (at '{field_path}')")]
pub struct ValidationError {
    pub field_path: String,
    pub reason: String,
}
