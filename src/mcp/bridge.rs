//! Expose an MCP server as a [`ToolProvider`].

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Result, ToolLoopError};
use crate::tools::{ToolProvider, ToolResponse};
use crate::types::ToolCatalogEntry;

use super::client::{MCPClient, MCPToolCallResult};
use super::schema::MCPToolSchema;

#[async_trait]
pub(crate) trait MCPClientOps: Send {
    async fn initialize(&mut self) -> Result<()>;
    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>>;
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<MCPToolCallResult>;
    async fn close(&mut self);
}

#[async_trait]
impl MCPClientOps for MCPClient {
    async fn initialize(&mut self) -> Result<()> {
        MCPClient::initialize(self).await
    }

    async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>> {
        MCPClient::list_tools(self).await
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<MCPToolCallResult> {
        MCPClient::call_tool(self, name, arguments).await
    }

    async fn close(&mut self) {
        MCPClient::close(self).await
    }
}

/// A connected MCP server, addressed by its config name.
pub struct McpToolProvider {
    id: String,
    client: Mutex<Box<dyn MCPClientOps>>,
}

impl McpToolProvider {
    pub fn new(id: impl Into<String>, client: MCPClient) -> Self {
        Self::from_client_ops(id, Box::new(client))
    }

    pub(crate) fn from_client_ops(id: impl Into<String>, client: Box<dyn MCPClientOps>) -> Self {
        Self {
            id: id.into(),
            client: Mutex::new(client),
        }
    }

    /// Close the underlying session.
    pub async fn shutdown(&self) {
        self.client.lock().await.close().await;
    }
}

impl std::fmt::Debug for McpToolProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolProvider").field("id", &self.id).finish()
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolCatalogEntry>> {
        let mut client = self.client.lock().await;
        client.initialize().await?;
        let tools = client.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|tool| tool.into_catalog_entry(&self.id))
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResponse> {
        let mut client = self.client.lock().await;
        client.initialize().await?;
        let result = client.call_tool(name, arguments).await?;
        Ok(call_result_to_response(result))
    }
}

/// Structured content wins, then joined text, then the raw content list.
fn call_result_to_response(result: MCPToolCallResult) -> ToolResponse {
    if let Some(structured) = result.structured_content {
        return ToolResponse::from(structured);
    }
    if let Some(text) = result.text_content {
        return ToolResponse::Text(text);
    }
    ToolResponse::ContentList(result.content)
}

impl From<MCPToolCallResult> for ToolResponse {
    fn from(result: MCPToolCallResult) -> Self {
        call_result_to_response(result)
    }
}

/// Surface a provider id with an error, for logs.
pub(crate) fn describe_failure(id: &str, err: &ToolLoopError) -> String {
    format!("MCP server '{id}': {err}")
}
