//! The Type Definition document as tenants author it.
//!
//! These types mirror the JSON exchanged with the configuration layer and are
//! deliberately loose: they accept anything shaped like a definition. The
//! checks that make a definition usable happen in [`crate::machine`] and
//! [`crate::definition`] when the document is compiled.

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::ids::TypeDefinitionId;

/// Whether a definition describes tickets or ticket items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    #[default]
    Ticket,
    Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinitionDocument {
    pub type_code: String,
    pub type_name: String,
    #[serde(default)]
    pub kind: DefinitionKind,
    /// JSON Schema for the free-form payload. Absent = any payload accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<StateMachineDocument>,
    /// Item types that may be nested under tickets of this type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_item_type_ids: Vec<TypeDefinitionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineDocument {
    pub initial_state: String,
    pub states: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionDocument>,
    #[serde(default, skip_serializing_if = "MilestonesDocument::is_empty")]
    pub milestones: MilestonesDocument,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDocument {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// Designated lifecycle states. Entering one stamps the matching timestamp
/// on the ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestonesDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<String>,
}

impl MilestonesDocument {
    pub fn is_empty(&self) -> bool {
        self.ready.is_none() && self.completed.is_none() && self.cancelled.is_none()
    }
}

impl TypeDefinitionDocument {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DefinitionError> {
        Self::deserialize(value).map_err(|e| DefinitionError::Malformed(e.to_string()))
    }

    pub fn from_json_str(src: &str) -> Result<Self, DefinitionError> {
        serde_json::from_str(src).map_err(|e| DefinitionError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Serializing plain data with string keys cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_camel_case_document() {
        let doc = TypeDefinitionDocument::from_json(&json!({
            "typeCode": "order",
            "typeName": "Order",
            "structuralSchema": { "type": "object" },
            "stateMachine": {
                "initialState": "received",
                "states": ["received", "ready"],
                "transitions": [{ "name": "finish", "from": "received", "to": "ready" }],
                "milestones": { "ready": "ready" }
            }
        }))
        .unwrap();

        assert_eq!(doc.type_code, "order");
        assert_eq!(doc.kind, DefinitionKind::Ticket);
        let machine = doc.state_machine.as_ref().unwrap();
        assert_eq!(machine.initial_state, "received");
        assert_eq!(machine.transitions[0].name, "finish");
        assert_eq!(machine.milestones.ready.as_deref(), Some("ready"));
        assert!(doc.nested_item_type_ids.is_empty());
    }

    #[test]
    fn item_kind_without_machine_parses() {
        let doc = TypeDefinitionDocument::from_json(&json!({
            "typeCode": "topping",
            "typeName": "Topping",
            "kind": "item"
        }))
        .unwrap();
        assert_eq!(doc.kind, DefinitionKind::Item);
        assert!(doc.state_machine.is_none());
    }

    #[test]
    fn missing_type_code_is_malformed() {
        let err = TypeDefinitionDocument::from_json(&json!({ "typeName": "Order" })).unwrap_err();
        match err {
            DefinitionError::Malformed(msg) => assert!(msg.contains("typeCode"), "{msg}"),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn to_json_omits_empty_sections() {
        let doc = TypeDefinitionDocument {
            type_code: "t".to_string(),
            type_name: "T".to_string(),
            kind: DefinitionKind::Item,
            structural_schema: None,
            state_machine: None,
            nested_item_type_ids: vec![],
        };
        let value = doc.to_json();
        assert!(value.get("structuralSchema").is_none());
        assert!(value.get("nestedItemTypeIds").is_none());
        assert_eq!(TypeDefinitionDocument::from_json(&value).unwrap(), doc);
    }
}
