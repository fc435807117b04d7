pub(crate) mod check;
pub(crate) mod simulate;
pub(crate) mod validate;

use std::path::Path;
use std::process;

use ticketflow_core::{
    DefinitionMeta, DefinitionScope, TypeDefinition, TypeDefinitionDocument, TypeDefinitionId,
};

use crate::{report_error, OutputFormat};

/// Read and parse a JSON file, exiting with status 1 on failure.
pub(crate) fn read_json(path: &Path, what: &str, output: OutputFormat, quiet: bool) -> serde_json::Value {
    let content = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading {} '{}': {}", what, path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Read a type definition document without compiling it.
pub(crate) fn read_document(path: &Path, output: OutputFormat, quiet: bool) -> TypeDefinitionDocument {
    let value = read_json(path, "type definition", output, quiet);
    match TypeDefinitionDocument::from_json(&value) {
        Ok(doc) => doc,
        Err(e) => {
            report_error(&format!("invalid type definition: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

/// Compile a standalone document. Nested item types are not resolved.
pub(crate) fn compile(
    document: TypeDefinitionDocument,
) -> Result<TypeDefinition, ticketflow_core::DefinitionError> {
    let meta = DefinitionMeta {
        id: TypeDefinitionId::new(),
        scope: DefinitionScope::System,
        version: 0,
        active: true,
    };
    TypeDefinition::compile(meta, document)
}

pub(crate) fn load_definition(path: &Path, output: OutputFormat, quiet: bool) -> TypeDefinition {
    match compile(read_document(path, output, quiet)) {
        Ok(definition) => definition,
        Err(e) => {
            report_error(&format!("invalid type definition: {}", e), output, quiet);
            process::exit(1);
        }
    }
}
