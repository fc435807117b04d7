use std::path::Path;

use ticketflow_core::{DefinitionKind, Milestone};

use super::load_definition;
use crate::OutputFormat;

pub(crate) fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let definition = load_definition(file, output, quiet);
    if quiet {
        return;
    }

    let kind = match definition.kind() {
        DefinitionKind::Ticket => "ticket",
        DefinitionKind::Item => "item",
    };
    let machine = definition.machine();
    let milestones = [Milestone::Ready, Milestone::Completed, Milestone::Cancelled];

    match output {
        OutputFormat::Json => {
            let machine_json = machine.map(|m| {
                let milestones: serde_json::Map<String, serde_json::Value> = milestones
                    .iter()
                    .filter_map(|ms| {
                        m.milestone_state(*ms)
                            .map(|state| (ms.as_str().to_string(), serde_json::json!(state)))
                    })
                    .collect();
                serde_json::json!({
                    "initialState": m.initial_state(),
                    "states": m.states(),
                    "transitions": m.transitions().iter().map(|t| serde_json::json!({
                        "name": t.name,
                        "from": t.from,
                        "to": t.to,
                    })).collect::<Vec<_>>(),
                    "milestones": milestones,
                })
            });
            let json = serde_json::json!({
                "valid": true,
                "typeCode": definition.code(),
                "typeName": definition.name(),
                "kind": kind,
                "hasSchema": definition.schema().is_some(),
                "stateMachine": machine_json,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            println!("{} ({}), {} type", definition.code(), definition.name(), kind);
            if definition.schema().is_some() {
                println!("  payload schema: yes");
            }
            let Some(m) = machine else {
                println!("  no state machine");
                return;
            };
            let states: Vec<String> = m
                .states()
                .iter()
                .map(|s| {
                    if s == m.initial_state() {
                        format!("{}*", s)
                    } else {
                        s.clone()
                    }
                })
                .collect();
            println!("  states: {}", states.join(", "));
            println!("  transitions:");
            for t in m.transitions() {
                println!("    {}: {} -> {}", t.name, t.from, t.to);
            }
            for ms in milestones {
                if let Some(state) = m.milestone_state(ms) {
                    println!("  {} milestone: {}", ms.as_str(), state);
                }
            }
        }
    }
}
