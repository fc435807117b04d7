//! `ticketflow simulate`: run a definition through a throwaway in-memory
//! engine, exactly as a tenant's tickets would be run.

use std::path::Path;
use std::process;

use serde::Serialize;

use ticketflow_core::{DefinitionKind, DefinitionScope, TicketId, TypeDefinitionDocument};
use ticketflow_engine::{Engine, EngineConfig, LifecycleError, NewTicket};
use ticketflow_storage::TransitionRecord;

use super::{compile, read_document, read_json};
use crate::{report_error, OutputFormat};

pub(crate) struct SimulateOptions<'a> {
    pub definition: &'a Path,
    pub payload: Option<&'a Path>,
    pub config: Option<&'a Path>,
    pub transitions: &'a [String],
    pub output: OutputFormat,
    pub quiet: bool,
}

#[derive(Debug, Serialize)]
struct Simulation {
    ticket_id: TicketId,
    type_code: String,
    final_state: String,
    history: Vec<TransitionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<Rejection>,
}

#[derive(Debug, Serialize)]
struct Rejection {
    transition: String,
    error: String,
    valid_transitions: Vec<String>,
}

pub(crate) fn cmd_simulate(opts: SimulateOptions<'_>) {
    let output = opts.output;
    let quiet = opts.quiet;

    let mut document = read_document(opts.definition, output, quiet);
    if let Err(e) = compile(document.clone()) {
        report_error(&format!("invalid type definition: {}", e), output, quiet);
        process::exit(1);
    }
    if document.kind == DefinitionKind::Item {
        let msg = format!(
            "'{}' is an item type; simulate needs a ticket type",
            document.type_code
        );
        report_error(&msg, output, quiet);
        process::exit(1);
    }
    // Items are never added during a simulation.
    document.nested_item_type_ids.clear();

    let payload = opts
        .payload
        .map(|path| read_json(path, "payload", output, quiet))
        .unwrap_or_else(|| serde_json::json!({}));

    let config = match opts.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                report_error(&format!("error: {}", e), output, quiet);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("error: failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let simulation = match runtime.block_on(run(document, payload, config, opts.transitions)) {
        Ok(simulation) => simulation,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    if !quiet {
        print_simulation(&simulation, output);
    }
    if simulation.rejected.is_some() {
        process::exit(1);
    }
}

async fn run(
    document: TypeDefinitionDocument,
    payload: serde_json::Value,
    config: EngineConfig,
    transitions: &[String],
) -> Result<Simulation, LifecycleError> {
    let engine = Engine::in_memory(config);
    let tenant = engine.directory().create_tenant("simulation").await?.id;
    let definition = engine
        .registry()
        .register(DefinitionScope::Tenant(tenant), document)
        .await?;
    let queue = engine
        .directory()
        .create_queue(tenant, "simulation", vec![definition.id()])
        .await?;
    let ticket = engine
        .lifecycle()
        .create_ticket(tenant, NewTicket::new(queue.id, definition.id(), payload))
        .await?;

    let mut current = ticket.current_state.clone();
    let mut rejected = None;
    for name in transitions {
        match engine
            .lifecycle()
            .transition_ticket(tenant, ticket.id, name, None)
            .await
        {
            Ok(outcome) => current = outcome.current_state,
            Err(err) if err.is_rejection() => {
                let valid_transitions = match &err {
                    LifecycleError::InvalidTransition {
                        valid_transitions, ..
                    } => valid_transitions.clone(),
                    _ => definition
                        .machine()
                        .map(|m| m.available_from(&current))
                        .unwrap_or_default(),
                };
                tracing::debug!(transition = %name, error = %err, "simulation stopped");
                rejected = Some(Rejection {
                    transition: name.clone(),
                    error: err.to_string(),
                    valid_transitions,
                });
                break;
            }
            Err(err) => return Err(err),
        }
    }

    let history = engine.audit().history(tenant, ticket.id).await?;
    Ok(Simulation {
        ticket_id: ticket.id,
        type_code: definition.code().to_string(),
        final_state: current,
        history,
        rejected,
    })
}

fn print_simulation(simulation: &Simulation, output: OutputFormat) {
    match output {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(simulation).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            println!(
                "ticket {} ({})",
                simulation.ticket_id, simulation.type_code
            );
            println!("history:");
            for (i, record) in simulation.history.iter().enumerate() {
                match (&record.transition_name, &record.previous_state) {
                    (Some(name), Some(previous)) => println!(
                        "  {}. {}: {} -> {}",
                        i + 1,
                        name,
                        previous,
                        record.new_state
                    ),
                    _ => println!("  {}. created -> {}", i + 1, record.new_state),
                }
            }
            println!("final state: {}", simulation.final_state);
            if let Some(rejection) = &simulation.rejected {
                eprintln!("rejected: {}", rejection.error);
                if rejection.valid_transitions.is_empty() {
                    eprintln!("valid transitions from '{}': (none)", simulation.final_state);
                } else {
                    eprintln!(
                        "valid transitions from '{}': {}",
                        simulation.final_state,
                        rejection.valid_transitions.join(", ")
                    );
                }
            }
        }
    }
}
