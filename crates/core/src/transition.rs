//! The transition engine.
//!
//! Given a definition, a current state, and a requested transition name,
//! compute the next state or explain why the request is rejected. Pure: no
//! I/O, no clock, no mutation.

use crate::definition::TypeDefinition;
use crate::error::TransitionError;
use crate::machine::{StateMachine, TransitionDef};

impl StateMachine {
    /// Resolve `transition` from `current_state`.
    ///
    /// - no transition of that name anywhere → `UnknownTransition`
    /// - declared, but not from `current_state` → `InvalidTransition`
    ///   carrying the names that are available from `current_state`
    pub fn resolve(
        &self,
        current_state: &str,
        transition: &str,
    ) -> Result<&TransitionDef, TransitionError> {
        let mut candidates = self.transitions_named(transition).peekable();
        if candidates.peek().is_none() {
            return Err(TransitionError::UnknownTransition {
                transition: transition.to_string(),
            });
        }
        candidates
            .find(|t| t.from == current_state)
            .ok_or_else(|| TransitionError::InvalidTransition {
                transition: transition.to_string(),
                current_state: current_state.to_string(),
                valid_transitions: self.available_from(current_state),
            })
    }
}

/// Apply `transition` to an entity of type `definition` currently in
/// `current_state`, returning the next state.
///
/// A definition without a state machine accepts no transitions at all.
pub fn apply<'d>(
    definition: &'d TypeDefinition,
    current_state: Option<&str>,
    transition: &str,
) -> Result<&'d str, TransitionError> {
    let Some(machine) = definition.machine() else {
        return Err(TransitionError::UnknownTransition {
            transition: transition.to_string(),
        });
    };
    match current_state {
        Some(state) => machine.resolve(state, transition).map(|t| t.to.as_str()),
        // A stateless entity of a stateful type cannot exist once compiled
        // definitions are enforced; report it as a state mismatch anyway.
        None => Err(TransitionError::InvalidTransition {
            transition: transition.to_string(),
            current_state: String::new(),
            valid_transitions: Vec::new(),
        }),
    }
}

/// One entry of a recorded history, as needed for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStep<'a> {
    /// `None` for the initial record.
    pub transition: Option<&'a str>,
    pub previous_state: Option<&'a str>,
    pub new_state: &'a str,
}

/// Where a recorded history stops agreeing with the machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("history step {index}: {reason}")]
pub struct ReplayError {
    pub index: usize,
    pub reason: String,
}

/// Rebuild the current state from an ordered history.
///
/// The first step must be the initial record (no previous state, landing on
/// the initial state); every later step must start where the previous one
/// ended and be a legal transition. Returns the final state.
pub fn replay<'a>(
    machine: &StateMachine,
    steps: impl IntoIterator<Item = ReplayStep<'a>>,
) -> Result<String, ReplayError> {
    let mut state: Option<String> = None;
    for (index, step) in steps.into_iter().enumerate() {
        let fail = |reason: String| ReplayError { index, reason };
        match (&state, step.previous_state, step.transition) {
            (None, None, None) => {
                if step.new_state != machine.initial_state() {
                    return Err(fail(format!(
                        "initial record lands on '{}', expected '{}'",
                        step.new_state,
                        machine.initial_state()
                    )));
                }
            }
            (None, _, _) => {
                return Err(fail("history does not start with an initial record".to_string()))
            }
            (Some(current), Some(previous), Some(name)) => {
                if current != previous {
                    return Err(fail(format!(
                        "previous state '{}' does not match replayed state '{}'",
                        previous, current
                    )));
                }
                let next = machine
                    .resolve(current, name)
                    .map_err(|e| fail(e.to_string()))?;
                if next.to != step.new_state {
                    return Err(fail(format!(
                        "transition '{}' leads to '{}', record says '{}'",
                        name, next.to, step.new_state
                    )));
                }
            }
            (Some(_), _, _) => {
                return Err(fail(
                    "only the first record may omit its previous state or transition".to_string(),
                ))
            }
        }
        state = Some(step.new_state.to_string());
    }
    state.ok_or(ReplayError {
        index: 0,
        reason: "empty history".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionMeta, DefinitionScope};
    use crate::document::{
        DefinitionKind, MilestonesDocument, StateMachineDocument, TransitionDocument,
        TypeDefinitionDocument,
    };
    use crate::ids::TypeDefinitionId;

    /// States {A, B, C}; t1: A→B, t2: B→C.
    fn abc() -> TypeDefinition {
        let doc = TypeDefinitionDocument {
            type_code: "abc".to_string(),
            type_name: "ABC".to_string(),
            kind: DefinitionKind::Ticket,
            structural_schema: None,
            state_machine: Some(StateMachineDocument {
                initial_state: "A".to_string(),
                states: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                transitions: vec![
                    TransitionDocument {
                        name: "t1".to_string(),
                        from: "A".to_string(),
                        to: "B".to_string(),
                    },
                    TransitionDocument {
                        name: "t2".to_string(),
                        from: "B".to_string(),
                        to: "C".to_string(),
                    },
                ],
                milestones: MilestonesDocument::default(),
            }),
            nested_item_type_ids: vec![],
        };
        TypeDefinition::compile(
            DefinitionMeta {
                id: TypeDefinitionId::new(),
                scope: DefinitionScope::System,
                version: 0,
                active: true,
            },
            doc,
        )
        .unwrap()
    }

    #[test]
    fn out_of_order_transition_lists_alternatives() {
        let def = abc();
        assert_eq!(
            apply(&def, Some("A"), "t2").unwrap_err(),
            TransitionError::InvalidTransition {
                transition: "t2".to_string(),
                current_state: "A".to_string(),
                valid_transitions: vec!["t1".to_string()],
            }
        );
    }

    #[test]
    fn walks_to_terminal_state() {
        let def = abc();
        let b = apply(&def, Some("A"), "t1").unwrap();
        assert_eq!(b, "B");
        let c = apply(&def, Some(b), "t2").unwrap();
        assert_eq!(c, "C");
    }

    #[test]
    fn declared_transition_from_wrong_state_is_invalid_not_unknown() {
        let def = abc();
        match apply(&def, Some("C"), "t1").unwrap_err() {
            TransitionError::InvalidTransition {
                valid_transitions, ..
            } => assert!(valid_transitions.is_empty()),
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn undeclared_name_is_unknown() {
        let def = abc();
        assert_eq!(
            apply(&def, Some("A"), "teleport").unwrap_err(),
            TransitionError::UnknownTransition {
                transition: "teleport".to_string()
            }
        );
    }

    #[test]
    fn stateless_type_accepts_nothing() {
        let doc = TypeDefinitionDocument {
            type_code: "note".to_string(),
            type_name: "Note".to_string(),
            kind: DefinitionKind::Item,
            structural_schema: None,
            state_machine: None,
            nested_item_type_ids: vec![],
        };
        let def = TypeDefinition::compile(
            DefinitionMeta {
                id: TypeDefinitionId::new(),
                scope: DefinitionScope::System,
                version: 0,
                active: true,
            },
            doc,
        )
        .unwrap();
        assert!(matches!(
            apply(&def, None, "anything"),
            Err(TransitionError::UnknownTransition { .. })
        ));
    }

    #[test]
    fn replay_reconstructs_final_state() {
        let def = abc();
        let machine = def.machine().unwrap();
        let steps = [
            ReplayStep {
                transition: None,
                previous_state: None,
                new_state: "A",
            },
            ReplayStep {
                transition: Some("t1"),
                previous_state: Some("A"),
                new_state: "B",
            },
            ReplayStep {
                transition: Some("t2"),
                previous_state: Some("B"),
                new_state: "C",
            },
        ];
        assert_eq!(replay(machine, steps).unwrap(), "C");
    }

    #[test]
    fn replay_detects_gap() {
        let def = abc();
        let machine = def.machine().unwrap();
        let steps = [
            ReplayStep {
                transition: None,
                previous_state: None,
                new_state: "A",
            },
            ReplayStep {
                transition: Some("t2"),
                previous_state: Some("B"),
                new_state: "C",
            },
        ];
        let err = replay(machine, steps).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn replay_rejects_empty_history() {
        let def = abc();
        assert!(replay(def.machine().unwrap(), Vec::<ReplayStep>::new()).is_err());
    }
}
