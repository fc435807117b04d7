//! Structural validation of free-form payloads.
//!
//! A type's `structuralSchema` is a JSON Schema document. It is compiled once
//! into a [`StructuralSchema`] when the definition is loaded; validation is
//! then total and side-effect free.

use std::fmt;
use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;

use crate::error::{DefinitionError, ValidationError};

/// A compiled JSON Schema together with its source document.
#[derive(Clone)]
pub struct StructuralSchema {
    document: serde_json::Value,
    validator: Arc<jsonschema::Validator>,
}

impl StructuralSchema {
    pub fn compile(document: serde_json::Value) -> Result<Self, DefinitionError> {
        let validator =
            jsonschema::validator_for(&document).map_err(|e| DefinitionError::InvalidSchema {
                reason: e.to_string(),
            })?;
        Ok(StructuralSchema {
            document,
            validator: Arc::new(validator),
        })
    }

    pub fn document(&self) -> &serde_json::Value {
        &self.document
    }
}

impl fmt::Debug for StructuralSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

/// Validate `payload` against `schema`, reporting the first violation.
///
/// An absent schema accepts every payload.
pub fn validate(
    payload: &serde_json::Value,
    schema: Option<&StructuralSchema>,
) -> Result<(), ValidationError> {
    match violations(payload, schema).into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}

/// Every violation of `schema` in `payload`, in the order the schema reports them.
pub fn violations(
    payload: &serde_json::Value,
    schema: Option<&StructuralSchema>,
) -> Vec<ValidationError> {
    let Some(schema) = schema else {
        return Vec::new();
    };
    schema
        .validator
        .iter_errors(payload)
        .map(|error| {
            let base = error.instance_path.to_string();
            // A missing property has no instance of its own; point at where it belongs.
            let field_path = match &error.kind {
                ValidationErrorKind::Required { property } => {
                    let name = property
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| property.to_string());
                    format!("{}/{}", base, escape_pointer_token(&name))
                }
                _ => base,
            };
            ValidationError {
                field_path,
                reason: error.to_string(),
            }
        })
        .collect()
}

/// RFC 6901 escaping of a single reference token.
fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
