//! Tool catalog types.

use serde::{Deserialize, Serialize};

/// A tool advertised by one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCatalogEntry {
    pub provider_id: String,
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
}

impl ToolCatalogEntry {
    pub fn new(
        provider_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: serde_json::Value,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            name: name.into(),
            description: description.into(),
            parameter_schema,
        }
    }
}

/// A tool as offered to the model: description namespaced by provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolCatalogEntry> for ToolSpec {
    fn from(entry: &ToolCatalogEntry) -> Self {
        Self {
            name: entry.name.clone(),
            description: format!("[{}] {}", entry.provider_id, entry.description),
            parameters: entry.parameter_schema.clone(),
        }
    }
}
