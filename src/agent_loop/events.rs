//! Turn event stream types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{TurnId, TurnStatus};

/// Kind of a turn event, as seen by transports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnEventKind {
    Start,
    AssistantMessage,
    Thinking,
    ToolCall,
    ToolResult,
    ToolError,
    Done,
    Error,
}

/// Concrete event payloads emitted by the orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventPayload {
    Start {
        query: String,
    },
    /// Text delta from the model.
    AssistantMessage {
        content: String,
    },
    /// Reasoning delta; `first` marks the first non-empty one of a response.
    Thinking {
        content: String,
        first: bool,
    },
    ToolCall {
        call_id: String,
        provider_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        result: String,
        duration_ms: u64,
    },
    ToolError {
        call_id: String,
        tool_name: String,
        error: String,
    },
    Done {
        status: TurnStatus,
    },
    Error {
        message: String,
    },
}

impl TurnEventPayload {
    pub fn kind(&self) -> TurnEventKind {
        match self {
            Self::Start { .. } => TurnEventKind::Start,
            Self::AssistantMessage { .. } => TurnEventKind::AssistantMessage,
            Self::Thinking { .. } => TurnEventKind::Thinking,
            Self::ToolCall { .. } => TurnEventKind::ToolCall,
            Self::ToolResult { .. } => TurnEventKind::ToolResult,
            Self::ToolError { .. } => TurnEventKind::ToolError,
            Self::Done { .. } => TurnEventKind::Done,
            Self::Error { .. } => TurnEventKind::Error,
        }
    }
}

/// Envelope for turn events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnEvent {
    pub turn_id: TurnId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TurnEventPayload,
}

impl TurnEvent {
    pub fn kind(&self) -> TurnEventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = TurnEventPayload::AssistantMessage {
            content: "hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"type": "assistant_message", "content": "hi"})
        );
        assert_eq!(payload.kind().to_string(), "assistant_message");
    }

    #[test]
    fn done_carries_status() {
        let payload = TurnEventPayload::Done {
            status: TurnStatus::Canceled,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"type": "done", "status": "canceled"})
        );
    }
}
