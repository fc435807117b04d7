//! Compiled state machines.
//!
//! A [`StateMachine`] is built once from a [`StateMachineDocument`] and is
//! immutable afterwards. Compilation rejects every definition the transition
//! engine could not answer unambiguously, so lookups at transition time never
//! fail for configuration reasons.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::document::{MilestonesDocument, StateMachineDocument};
use crate::error::DefinitionError;

/// Name of the transition treated as the cancellation when no `cancelled`
/// milestone is declared.
pub const DEFAULT_CANCEL_TRANSITION: &str = "cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDef {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// A designated lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    Ready,
    Completed,
    Cancelled,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::Ready => "ready",
            Milestone::Completed => "completed",
            Milestone::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    initial: String,
    /// Declared order, used for display.
    states: Vec<String>,
    state_set: HashSet<String>,
    transitions: Vec<TransitionDef>,
    /// transition name -> indices into `transitions`
    by_name: HashMap<String, Vec<usize>>,
    milestones: MilestonesDocument,
}

impl StateMachine {
    pub fn compile(doc: &StateMachineDocument) -> Result<Self, DefinitionError> {
        let mut state_set = HashSet::with_capacity(doc.states.len());
        for state in &doc.states {
            if !state_set.insert(state.clone()) {
                return Err(DefinitionError::DuplicateState {
                    state: state.clone(),
                });
            }
        }

        if !state_set.contains(&doc.initial_state) {
            return Err(DefinitionError::UnknownInitialState {
                initial: doc.initial_state.clone(),
                states: doc.states.clone(),
            });
        }

        let mut transitions = Vec::with_capacity(doc.transitions.len());
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for t in &doc.transitions {
            if t.name.trim().is_empty() {
                return Err(DefinitionError::EmptyTransitionName);
            }
            for endpoint in [&t.from, &t.to] {
                if !state_set.contains(endpoint) {
                    return Err(DefinitionError::UnknownTransitionState {
                        transition: t.name.clone(),
                        state: endpoint.clone(),
                    });
                }
            }
            if !seen.insert((t.name.as_str(), t.from.as_str())) {
                return Err(DefinitionError::AmbiguousTransition {
                    transition: t.name.clone(),
                    from: t.from.clone(),
                });
            }
            by_name
                .entry(t.name.clone())
                .or_default()
                .push(transitions.len());
            transitions.push(TransitionDef {
                name: t.name.clone(),
                from: t.from.clone(),
                to: t.to.clone(),
            });
        }

        let milestones = &doc.milestones;
        for (milestone, state) in [
            (Milestone::Ready, &milestones.ready),
            (Milestone::Completed, &milestones.completed),
            (Milestone::Cancelled, &milestones.cancelled),
        ] {
            if let Some(state) = state {
                if !state_set.contains(state) {
                    return Err(DefinitionError::UnknownMilestoneState {
                        milestone: milestone.as_str().to_string(),
                        state: state.clone(),
                    });
                }
            }
        }

        Ok(StateMachine {
            initial: doc.initial_state.clone(),
            states: doc.states.clone(),
            state_set,
            transitions,
            by_name,
            milestones: milestones.clone(),
        })
    }

    pub fn initial_state(&self) -> &str {
        &self.initial
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.state_set.contains(state)
    }

    pub fn transitions(&self) -> &[TransitionDef] {
        &self.transitions
    }

    /// All transitions declared under `name`, across every "from" state.
    pub fn transitions_named(&self, name: &str) -> impl Iterator<Item = &TransitionDef> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&i| &self.transitions[i])
    }

    /// Sorted, de-duplicated names of the transitions leaving `state`.
    pub fn available_from(&self, state: &str) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .transitions
            .iter()
            .filter(|t| t.from == state)
            .map(|t| t.name.as_str())
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    pub fn milestone_state(&self, milestone: Milestone) -> Option<&str> {
        match milestone {
            Milestone::Ready => self.milestones.ready.as_deref(),
            Milestone::Completed => self.milestones.completed.as_deref(),
            Milestone::Cancelled => self.milestones.cancelled.as_deref(),
        }
    }

    /// Every milestone designating `state`. One state may carry several.
    pub fn milestones_of(&self, state: &str) -> Vec<Milestone> {
        [Milestone::Ready, Milestone::Completed, Milestone::Cancelled]
            .into_iter()
            .filter(|m| self.milestone_state(*m) == Some(state))
            .collect()
    }

    /// A state is closed once it is the completed or cancelled milestone.
    pub fn is_closed(&self, state: &str) -> bool {
        self.milestone_state(Milestone::Completed) == Some(state)
            || self.milestone_state(Milestone::Cancelled) == Some(state)
    }

    /// The cancellation transition leaving `state`, if any.
    ///
    /// With a `cancelled` milestone, any transition into that state counts;
    /// without one, the transition named [`DEFAULT_CANCEL_TRANSITION`] does.
    pub fn cancellation_from(&self, state: &str) -> Option<&TransitionDef> {
        match self.milestone_state(Milestone::Cancelled) {
            Some(cancelled) => self
                .transitions
                .iter()
                .find(|t| t.from == state && t.to == cancelled),
            None => self
                .transitions_named(DEFAULT_CANCEL_TRANSITION)
                .find(|t| t.from == state),
        }
    }
}
