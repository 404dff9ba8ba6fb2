//! MCP client over an rmcp running session.

use crate::error::ToolLoopError;
use rmcp::{
    model::{CallToolRequestParams, CallToolResult, Content, JsonObject, ResourceContents},
    service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceError},
};

use super::schema::MCPToolSchema;

type DynClientService = Box<dyn DynService<RoleClient>>;
pub type MCPRunningService = RunningService<RoleClient, DynClientService>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MCPConnectionState {
    Connected,
    Initialized,
    Closed,
}

/// Result of a successful MCP tool call.
#[derive(Debug, Clone)]
pub struct MCPToolCallResult {
    pub structured_content: Option<serde_json::Value>,
    pub text_content: Option<String>,
    pub content: Vec<serde_json::Value>,
}

/// Client for one MCP server session.
pub struct MCPClient {
    session: Option<MCPRunningService>,
    state: MCPConnectionState,
}

impl MCPClient {
    /// Wrap an already-initialized rmcp service.
    pub fn from_running_service(session: MCPRunningService) -> Self {
        Self {
            session: Some(session),
            state: MCPConnectionState::Connected,
        }
    }

    /// Convert an rmcp initialization result into a client.
    pub fn from_running_service_result(
        result: Result<MCPRunningService, ClientInitializeError>,
    ) -> Result<Self, ToolLoopError> {
        result
            .map(Self::from_running_service)
            .map_err(map_client_initialize_error)
    }

    pub fn connection_state(&self) -> MCPConnectionState {
        self.state
    }

    /// Mark the session ready, failing if the peer has gone away.
    pub async fn initialize(&mut self) -> Result<(), ToolLoopError> {
        if self.state == MCPConnectionState::Initialized {
            return Ok(());
        }
        let Some(session) = self.session.as_ref() else {
            self.state = MCPConnectionState::Closed;
            return Err(ToolLoopError::Stream("MCP session is closed".into()));
        };
        if session.is_closed() {
            self.state = MCPConnectionState::Closed;
            return Err(ToolLoopError::Stream("MCP session is closed".into()));
        }
        self.state = MCPConnectionState::Initialized;
        Ok(())
    }

    pub async fn list_tools(&mut self) -> Result<Vec<MCPToolSchema>, ToolLoopError> {
        let session = self.session_ref()?;

        let tools = match session.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => {
                let page = session
                    .list_tools(None)
                    .await
                    .map_err(|e| map_service_error("list_tools", e))?;
                page.tools
            }
            Err(e) => return Err(map_service_error("list_tools", e)),
        };

        Ok(tools.into_iter().map(map_mcp_tool_schema).collect())
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<MCPToolCallResult, ToolLoopError> {
        let session = self.session_ref()?;
        let arguments = coerce_tool_arguments(arguments)?;

        let result = session
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error("call_tool", e))?;

        map_call_result(name, result)
    }

    /// Shut the session down; the server process exits with it.
    pub async fn close(&mut self) {
        self.state = MCPConnectionState::Closed;
        if let Some(session) = self.session.take() {
            if let Err(err) = session.cancel().await {
                tracing::warn!(error = %err, "MCP session did not shut down cleanly");
            }
        }
    }

    fn session_ref(&mut self) -> Result<&mut MCPRunningService, ToolLoopError> {
        match self.state {
            MCPConnectionState::Initialized => {}
            MCPConnectionState::Closed => {
                return Err(ToolLoopError::Stream("MCP session is closed".into()))
            }
            MCPConnectionState::Connected => {
                return Err(ToolLoopError::InvalidState(
                    "MCP client must be initialized first".into(),
                ))
            }
        }
        self.session
            .as_mut()
            .ok_or_else(|| ToolLoopError::Stream("MCP session is closed".into()))
    }
}

fn map_mcp_tool_schema(tool: rmcp::model::Tool) -> MCPToolSchema {
    MCPToolSchema {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn coerce_tool_arguments(value: serde_json::Value) -> Result<Option<JsonObject>, ToolLoopError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        other => Err(ToolLoopError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<MCPToolCallResult, ToolLoopError> {
    let text_content = extract_text_content(&result.content);
    let content = result
        .content
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect::<Vec<_>>();

    if result.is_error.unwrap_or(false) {
        let message = text_content
            .clone()
            .or_else(|| result.structured_content.as_ref().map(|v| v.to_string()))
            .unwrap_or_else(|| "MCP tool returned an error result".into());
        return Err(ToolLoopError::tool(name, message));
    }

    Ok(MCPToolCallResult {
        structured_content: result.structured_content,
        text_content,
        content,
    })
}

pub(crate) fn map_client_initialize_error(error: ClientInitializeError) -> ToolLoopError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            ToolLoopError::Stream(format!("MCP initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => ToolLoopError::Stream(format!(
            "MCP initialize transport error ({context}): {error}"
        )),
        ClientInitializeError::JsonRpcError(error) => ToolLoopError::provider(
            "mcp",
            format!("MCP initialize JSON-RPC error {}: {}", error.code.0, error.message),
        ),
        ClientInitializeError::Cancelled => {
            ToolLoopError::Stream("MCP initialize cancelled".into())
        }
        other => ToolLoopError::provider("mcp", format!("MCP initialize error: {other}")),
    }
}

fn map_service_error(context: &str, error: ServiceError) -> ToolLoopError {
    match error {
        ServiceError::McpError(error) => ToolLoopError::provider(
            "mcp",
            format!("{context}: MCP error {}: {}", error.code.0, error.message),
        ),
        ServiceError::TransportSend(error) => {
            ToolLoopError::Stream(format!("{context}: MCP transport send failed: {error}"))
        }
        ServiceError::TransportClosed => {
            ToolLoopError::Stream(format!("{context}: MCP transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            ToolLoopError::provider("mcp", format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            ToolLoopError::Stream(format!("{context}: MCP request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => ToolLoopError::Timeout(timeout.as_millis() as u64),
        other => ToolLoopError::provider("mcp", format!("{context}: MCP service error: {other}")),
    }
}
