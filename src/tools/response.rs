//! Tool responses and their normalization to a single text payload.

use serde_json::{Map, Value};

/// Fields that carry the payload of a keyed response, in lookup order.
const PAYLOAD_FIELDS: [&str; 3] = ["content", "result", "output"];

/// Shape of a provider's response to a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse {
    Text(String),
    KeyedFields(Map<String, Value>),
    ContentList(Vec<Value>),
}

impl ToolResponse {
    /// Normalize to the text the model will see.
    ///
    /// Keyed responses use their `content`/`result`/`output` field, then a
    /// `text` field, then the serialized object. Lists yield their first
    /// element. Anything else is coerced to a string.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::KeyedFields(fields) => keyed_to_text(fields),
            Self::ContentList(items) => list_to_text(items),
        }
    }
}

impl From<Value> for ToolResponse {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(fields) => Self::KeyedFields(fields),
            Value::Array(items) => Self::ContentList(items),
            Value::Null => Self::Text(String::new()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<String> for ToolResponse {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

fn keyed_to_text(mut fields: Map<String, Value>) -> String {
    for key in PAYLOAD_FIELDS {
        if let Some(value) = fields.remove(key) {
            return ToolResponse::from(value).into_text();
        }
    }
    match fields.get("text") {
        Some(Value::String(text)) => text.clone(),
        _ => Value::Object(fields).to_string(),
    }
}

fn list_to_text(items: Vec<Value>) -> String {
    items
        .into_iter()
        .next()
        .map(|first| ToolResponse::from(first).into_text())
        .unwrap_or_default()
}
