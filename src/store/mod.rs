//! Durable conversation storage.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryConversationStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConversationStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolLoopError};
use crate::types::Role;

/// Default number of conversations returned by `list_recent`.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// One persisted entry of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredEntry {
    Message {
        role: Role,
        content: String,
        timestamp: DateTime<Utc>,
    },
    ToolCall {
        tool_name: String,
        arguments: String,
        result: String,
        is_error: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Listing row for a stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of user messages.
    pub turns: u32,
    pub summary: Option<String>,
}

/// A stored conversation with all of its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    pub id: String,
    pub title: String,
    pub system_prompt: Option<String>,
    pub summary: Option<String>,
    pub turns: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<StoredEntry>,
}

impl StoredConversation {
    /// A fresh, empty conversation with a generated id.
    pub fn new(title: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title
                .map(str::to_string)
                .unwrap_or_else(|| default_title(now)),
            system_prompt: None,
            summary: None,
            turns: 0,
            created_at: now,
            updated_at: now,
            entries: Vec::new(),
        }
    }

    pub fn push_message(&mut self, role: Role, content: &str) {
        let timestamp = Utc::now();
        if role == Role::User {
            self.turns += 1;
        }
        self.entries.push(StoredEntry::Message {
            role,
            content: content.to_string(),
            timestamp,
        });
        self.updated_at = timestamp;
    }

    pub fn push_tool_call(&mut self, tool_name: &str, arguments: &str, result: &str, is_error: bool) {
        let timestamp = Utc::now();
        self.entries.push(StoredEntry::ToolCall {
            tool_name: tool_name.to_string(),
            arguments: arguments.to_string(),
            result: result.to_string(),
            is_error,
            timestamp,
        });
        self.updated_at = timestamp;
    }

    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.system_prompt = Some(prompt.to_string());
        self.updated_at = Utc::now();
    }

    pub fn set_summary(&mut self, summary: &str) {
        self.summary = Some(summary.to_string());
        self.updated_at = Utc::now();
    }

    pub fn to_summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            turns: self.turns,
            summary: self.summary.clone(),
        }
    }
}

/// `Conversation YYYY-MM-DD HH:MM`.
pub fn default_title(at: DateTime<Utc>) -> String {
    format!("Conversation {}", at.format("%Y-%m-%d %H:%M"))
}

pub(crate) fn not_found(id: &str) -> ToolLoopError {
    ToolLoopError::Storage(format!("conversation {id} not found"))
}

/// Persistence boundary for conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create an empty conversation and return its id.
    async fn create_conversation(&self, title: Option<&str>) -> Result<String>;

    async fn set_system_prompt(&self, id: &str, prompt: &str) -> Result<()>;

    async fn append_message(&self, id: &str, role: Role, text: &str) -> Result<()>;

    async fn append_tool_call(
        &self,
        id: &str,
        tool_name: &str,
        arguments: &str,
        result: &str,
        is_error: bool,
    ) -> Result<()>;

    async fn update_summary(&self, id: &str, summary: &str) -> Result<()>;

    async fn get_conversation(&self, id: &str) -> Result<Option<StoredConversation>>;

    /// Most recently updated first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<ConversationSummary>>;

    /// Every conversation, most recently updated first.
    async fn list_all(&self) -> Result<Vec<ConversationSummary>>;

    /// Returns whether a conversation was removed.
    async fn delete_conversation(&self, id: &str) -> Result<bool>;
}
