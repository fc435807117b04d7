mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Ticket type definition toolchain.
#[derive(Parser)]
#[command(name = "ticketflow", version, about = "Ticket type definition toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log level for engine diagnostics on stderr (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a type definition document and describe its state machine
    Check {
        /// Path to the type definition JSON document
        definition: PathBuf,
    },

    /// Validate a payload against a type definition's structural schema
    Validate {
        /// Path to the type definition JSON document
        definition: PathBuf,
        /// Path to the payload JSON file
        payload: PathBuf,
    },

    /// Create one ticket in an in-memory engine and apply transitions to it
    Simulate {
        /// Path to the type definition JSON document
        definition: PathBuf,
        /// Path to the ticket payload JSON file (default: empty object)
        #[arg(long)]
        payload: Option<PathBuf>,
        /// Path to an engine TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Transition names, applied in order
        transitions: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    // A subscriber may already be installed by an embedding harness.
    let _ = ticketflow_engine::telemetry::init_tracing(&cli.log_level);

    match cli.command {
        Commands::Check { definition } => {
            commands::check::cmd_check(&definition, cli.output, cli.quiet);
        }
        Commands::Validate {
            definition,
            payload,
        } => {
            commands::validate::cmd_validate(&definition, &payload, cli.output, cli.quiet);
        }
        Commands::Simulate {
            definition,
            payload,
            config,
            transitions,
        } => {
            commands::simulate::cmd_simulate(commands::simulate::SimulateOptions {
                definition: &definition,
                payload: payload.as_deref(),
                config: config.as_deref(),
                transitions: &transitions,
                output: cli.output,
                quiet: cli.quiet,
            });
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
