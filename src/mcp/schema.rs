//! MCP schema types.

use serde::{Deserialize, Serialize};

use crate::types::ToolCatalogEntry;

/// Schema for a tool exposed by an MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

impl MCPToolSchema {
    /// Catalog entry owned by `provider_id`.
    pub fn into_catalog_entry(self, provider_id: &str) -> ToolCatalogEntry {
        ToolCatalogEntry {
            provider_id: provider_id.to_string(),
            name: self.name,
            description: self.description.unwrap_or_default(),
            parameter_schema: self.input_schema,
        }
    }
}
