use std::path::Path;
use std::process;

use ticketflow_core::schema;

use super::{load_definition, read_json};
use crate::OutputFormat;

pub(crate) fn cmd_validate(
    definition_path: &Path,
    payload_path: &Path,
    output: OutputFormat,
    quiet: bool,
) {
    let definition = load_definition(definition_path, output, quiet);
    let payload = read_json(payload_path, "payload", output, quiet);
    let violations = schema::violations(&payload, definition.schema());

    if violations.is_empty() {
        if !quiet {
            match output {
                OutputFormat::Text => println!("valid"),
                OutputFormat::Json => println!("{}", serde_json::json!({ "valid": true })),
            }
        }
        return;
    }

    match output {
        OutputFormat::Text => {
            if !quiet {
                eprintln!("invalid payload for '{}'", definition.code());
                for v in &violations {
                    let path = if v.field_path.is_empty() {
                        "(root)"
                    } else {
                        v.field_path.as_str()
                    };
                    eprintln!("  - {}: {}", path, v.reason);
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "valid": false,
                "errors": violations,
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
    }
    process::exit(1);
}
