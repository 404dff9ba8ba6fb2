//! Process-local conversation store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{not_found, ConversationStore, ConversationSummary, StoredConversation};
use crate::error::Result;
use crate::types::Role;

/// Keeps conversations in memory for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, StoredConversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut StoredConversation)) -> Result<()> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let conversation = conversations.get_mut(id).ok_or_else(|| not_found(id))?;
        apply(conversation);
        Ok(())
    }

    fn summaries(&self) -> Vec<ConversationSummary> {
        let conversations = self
            .conversations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut summaries: Vec<_> = conversations.values().map(StoredConversation::to_summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, title: Option<&str>) -> Result<String> {
        let conversation = StoredConversation::new(title);
        let id = conversation.id.clone();
        self.conversations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.clone(), conversation);
        Ok(id)
    }

    async fn set_system_prompt(&self, id: &str, prompt: &str) -> Result<()> {
        self.update(id, |c| c.set_system_prompt(prompt))
    }

    async fn append_message(&self, id: &str, role: Role, text: &str) -> Result<()> {
        self.update(id, |c| c.push_message(role, text))
    }

    async fn append_tool_call(
        &self,
        id: &str,
        tool_name: &str,
        arguments: &str,
        result: &str,
        is_error: bool,
    ) -> Result<()> {
        self.update(id, |c| c.push_tool_call(tool_name, arguments, result, is_error))
    }

    async fn update_summary(&self, id: &str, summary: &str) -> Result<()> {
        self.update(id, |c| c.set_summary(summary))
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<StoredConversation>> {
        Ok(self
            .conversations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let mut summaries = self.summaries();
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn list_all(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self.summaries())
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        Ok(self
            .conversations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
            .is_some())
    }
}
