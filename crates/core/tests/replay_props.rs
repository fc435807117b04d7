use proptest::prelude::*;

use ticketflow_core::transition::replay;
use ticketflow_core::{ReplayStep, StateMachine, StateMachineDocument, TransitionDocument};

fn repair_machine() -> StateMachine {
    let t = |name: &str, from: &str, to: &str| TransitionDocument {
        name: name.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    };
    StateMachine::compile(&StateMachineDocument {
        initial_state: "received".to_string(),
        states: ["received", "in_progress", "on_hold", "done", "cancelled"]
            .map(String::from)
            .to_vec(),
        transitions: vec![
            t("start", "received", "in_progress"),
            t("hold", "in_progress", "on_hold"),
            t("resume", "on_hold", "in_progress"),
            t("finish", "in_progress", "done"),
            t("cancel", "received", "cancelled"),
            t("cancel", "in_progress", "cancelled"),
            t("cancel", "on_hold", "cancelled"),
        ],
        milestones: Default::default(),
    })
    .unwrap()
}

/// (transition, previous_state, new_state) triples from a walk that picks
/// the `choice % available`th transition at every step.
type History = Vec<(Option<String>, Option<String>, String)>;

fn walk(machine: &StateMachine, choices: &[usize]) -> History {
    let mut history = vec![(None, None, machine.initial_state().to_string())];
    let mut state = machine.initial_state().to_string();
    for choice in choices {
        let available = machine.available_from(&state);
        if available.is_empty() {
            break;
        }
        let name = &available[choice % available.len()];
        let next = machine.resolve(&state, name).unwrap().to.clone();
        history.push((Some(name.clone()), Some(state.clone()), next.clone()));
        state = next;
    }
    history
}

fn steps(history: &History) -> Vec<ReplayStep<'_>> {
    history
        .iter()
        .map(|(transition, previous, new)| ReplayStep {
            transition: transition.as_deref(),
            previous_state: previous.as_deref(),
            new_state: new,
        })
        .collect()
}

proptest! {
    #[test]
    fn replay_reaches_the_walked_state(choices in prop::collection::vec(any::<usize>(), 0..40)) {
        let machine = repair_machine();
        let history = walk(&machine, &choices);
        let last = history.last().map(|h| h.2.clone()).unwrap();

        for (_, _, state) in &history {
            prop_assert!(machine.has_state(state));
        }
        prop_assert_eq!(replay(&machine, steps(&history)).unwrap(), last);
    }

    #[test]
    fn tampered_history_is_rejected(
        choices in prop::collection::vec(any::<usize>(), 1..40),
        victim in any::<prop::sample::Index>(),
    ) {
        let machine = repair_machine();
        let mut history = walk(&machine, &choices);
        prop_assume!(history.len() > 1);

        // No transition leads back to the initial state.
        let index = 1 + victim.index(history.len() - 1);
        history[index].2 = "received".to_string();

        let err = replay(&machine, steps(&history)).unwrap_err();
        prop_assert_eq!(err.index, index);
    }
}
