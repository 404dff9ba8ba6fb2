//! Permissive recovery of model-produced tool arguments.

use serde_json::{Map, Value};

/// Parse raw tool-call arguments into a JSON object, never failing.
///
/// Empty, `null` and `undefined` become `{}`. Text that does not parse as an
/// object and is not brace-wrapped is wrapped once and retried. Anything
/// still unparsable becomes `{}`.
pub fn parse_tool_arguments(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
        return Value::Object(Map::new());
    }

    if let Ok(map) = serde_json::from_str::<Map<String, Value>>(trimmed) {
        return Value::Object(map);
    }

    if !trimmed.starts_with('{') {
        let wrapped = format!("{{{trimmed}}}");
        if let Ok(map) = serde_json::from_str::<Map<String, Value>>(&wrapped) {
            return Value::Object(map);
        }
    }

    tracing::debug!(raw = %trimmed, "unparsable tool arguments, using empty object");
    Value::Object(Map::new())
}
