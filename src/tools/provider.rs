//! Tool-provider boundary: an already-open channel to one provider process.

use async_trait::async_trait;

use super::response::ToolResponse;
use crate::error::Result;
use crate::types::ToolCatalogEntry;

/// A connected tool provider.
///
/// Implementations own their channel; the engine never spawns or initializes
/// providers, it only lists and calls.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Identifier used to namespace and route this provider's tools.
    fn id(&self) -> &str;

    /// Catalog of tools this provider exposes.
    async fn list_tools(&self) -> Result<Vec<ToolCatalogEntry>>;

    /// Invoke one tool and return its raw response.
    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolResponse>;
}
