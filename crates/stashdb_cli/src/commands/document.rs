//! Schemaless record type used when the real record types are unknown.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stashdb_core::Record;

/// Any JSON object stored in a collection; its id is the `id` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub Value);

impl Record for Document {
    type Id = String;

    fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    fn set_id(&mut self, id: String) {
        if let Value::Object(fields) = &mut self.0 {
            fields.insert("id".to_string(), Value::String(id));
        }
    }
}
