//! Model Context Protocol (MCP) servers as tool providers.

pub mod bridge;
pub mod client;
pub mod schema;
pub mod transport;

use std::sync::Arc;

pub use bridge::McpToolProvider;
pub use client::MCPClient;
pub use transport::connect_stdio;

use crate::config::McpServersConfig;
use crate::error::{Result, ToolLoopError};

/// Connect every configured server. Servers that fail to start are logged
/// and skipped; it is an error only if none connect.
pub async fn connect_all(config: &McpServersConfig) -> Result<Vec<Arc<McpToolProvider>>> {
    if config.is_empty() {
        return Err(ToolLoopError::Configuration(
            "no MCP servers configured".into(),
        ));
    }

    let mut providers = Vec::with_capacity(config.servers.len());
    for (name, server) in &config.servers {
        match connect_stdio(server).await {
            Ok(client) => {
                tracing::info!(server = %name, command = %server.command, "connected MCP server");
                providers.push(Arc::new(McpToolProvider::new(name.clone(), client)));
            }
            Err(err) => {
                tracing::warn!("{}", bridge::describe_failure(name, &err));
            }
        }
    }

    if providers.is_empty() {
        return Err(ToolLoopError::Configuration(
            "failed to connect to any MCP server".into(),
        ));
    }
    Ok(providers)
}
