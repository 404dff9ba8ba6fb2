//! Stdio bootstrap for local MCP servers.

use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, ServiceExt};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;

use crate::config::McpServerConfig;
use crate::error::ToolLoopError;

use super::client::{map_client_initialize_error, MCPClient};

/// Build the child command: the server's env is layered over ours.
pub fn server_command(server: &McpServerConfig) -> Command {
    let mut command = Command::new(&server.command);
    command.args(&server.args);
    if let Some(env) = &server.env {
        command.envs(env);
    }
    command
}

/// Spawn `server` and complete the MCP handshake.
pub async fn connect_stdio(server: &McpServerConfig) -> Result<MCPClient, ToolLoopError> {
    let transport = TokioChildProcess::new(server_command(server)).map_err(|error| {
        map_client_initialize_error(ClientInitializeError::transport::<TokioChildProcess>(
            error,
            "spawn stdio transport",
        ))
    })?;

    let session = ClientInfo::default().into_dyn().serve(transport).await;
    MCPClient::from_running_service_result(session)
}
