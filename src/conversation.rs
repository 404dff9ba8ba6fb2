//! Conversation state: the ordered message log sent to the model each turn.

use crate::types::{ChatMessage, Role};

/// Default maximum number of messages retained.
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// Ordered, capped message log.
///
/// A system message, when present, always sits at index 0 and is never
/// evicted by trimming.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    cap: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_HISTORY_CAP)
    }

    /// Create a conversation retaining at most `cap` messages (minimum 1).
    pub fn with_cap(cap: usize) -> Self {
        Self {
            messages: Vec::new(),
            cap: cap.max(1),
        }
    }

    /// Append a user message, seeding or replacing the system prompt when
    /// one is given, then trim to the cap.
    pub fn add_user_message(&mut self, text: impl Into<String>, system_prompt: Option<&str>) -> &[ChatMessage] {
        match (self.messages.first().map(|m| m.role), system_prompt) {
            (Some(Role::System), Some(prompt)) => {
                self.messages[0].content = Some(prompt.to_string());
            }
            (_, Some(prompt)) => {
                self.messages.insert(0, ChatMessage::system(prompt));
            }
            // Without a prompt, history that has no System message keeps none.
            (_, None) => {}
        }
        self.messages.push(ChatMessage::user(text));
        self.trim();
        &self.messages
    }

    /// Append an assistant message as-is.
    pub fn add_assistant_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append a tool result for the given call id.
    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.messages
            .push(ChatMessage::tool_result(tool_call_id, content));
    }

    /// Drop everything except the system message.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
        self.messages.truncate(1);
    }

    /// Full ordered copy for the next model request.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .and_then(|m| m.content.as_deref())
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn trim(&mut self) {
        if self.messages.len() <= self.cap {
            return;
        }
        let keeps_system = self.messages[0].role == Role::System;
        let budget = if keeps_system { self.cap - 1 } else { self.cap };
        let evict_from = usize::from(keeps_system);
        let excess = self.messages.len() - evict_from - budget;
        self.messages.drain(evict_from..evict_from + excess);
    }
}
