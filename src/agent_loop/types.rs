//! Core turn types for the orchestration loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique turn identifier.
pub type TurnId = Uuid;

/// Phase of a turn in progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    Querying,
    Evaluating,
    ExecutingTools,
    Completed,
}

/// Terminal status of a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
    Canceled,
}

/// A tool call executed during a turn, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutedToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub result: String,
    pub is_error: bool,
}

/// Result of one turn.
///
/// `text` is the final answer on success and a human-readable error string on
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub status: TurnStatus,
    pub text: String,
    pub iterations: usize,
    pub tool_calls: Vec<ExecutedToolCall>,
    /// Messages appended to the conversation beyond the user message.
    pub appended_messages: usize,
    pub finished_at: DateTime<Utc>,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}
