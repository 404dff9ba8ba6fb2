//! Streaming response aggregator.
//!
//! Folds the increments of one model response into an [`AssembledMessage`],
//! forwarding text and reasoning deltas to a live callback as they arrive.

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, FinishReason, StreamIncrement, ToolCallFragment, ToolCallRequest};

/// What the model said in one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledMessage {
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<FinishReason>,
}

impl AssembledMessage {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Assistant message for the conversation log.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::assistant_with_tool_calls(self.content.clone(), self.tool_calls.clone())
    }
}

/// A live delta forwarded while aggregating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveDelta<'a> {
    Text(&'a str),
    Reasoning { text: &'a str, first: bool },
}

#[derive(Debug, Default, Clone)]
struct ToolCallSlot {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates increments for a single response.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    content: String,
    reasoning: String,
    slots: Vec<ToolCallSlot>,
    finish_reason: Option<FinishReason>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one increment, calling `on_delta` for each non-empty text or
    /// reasoning delta in arrival order.
    pub fn push(&mut self, increment: StreamIncrement, mut on_delta: impl FnMut(LiveDelta<'_>)) {
        if let Some(reasoning) = increment.reasoning.as_deref().filter(|r| !r.is_empty()) {
            let first = self.reasoning.is_empty();
            self.reasoning.push_str(reasoning);
            on_delta(LiveDelta::Reasoning {
                text: reasoning,
                first,
            });
        }
        if let Some(text) = increment.text.as_deref().filter(|t| !t.is_empty()) {
            self.content.push_str(text);
            on_delta(LiveDelta::Text(text));
        }
        for fragment in increment.tool_calls {
            self.apply_fragment(fragment);
        }
        if increment.finish_reason.is_some() {
            self.finish_reason = increment.finish_reason;
        }
    }

    fn apply_fragment(&mut self, fragment: ToolCallFragment) {
        if self.slots.len() <= fragment.index {
            self.slots.resize_with(fragment.index + 1, ToolCallSlot::default);
        }
        let slot = &mut self.slots[fragment.index];
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            slot.id = id;
        }
        if let Some(name) = fragment.name.filter(|name| !name.is_empty()) {
            slot.name = name;
        }
        if let Some(arguments) = fragment.arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    /// Close the response. Slots that never received an id are dropped.
    pub fn finish(self) -> AssembledMessage {
        let tool_calls = self
            .slots
            .into_iter()
            .filter(|slot| !slot.id.is_empty())
            .map(|slot| ToolCallRequest {
                id: slot.id,
                name: slot.name,
                raw_arguments: slot.arguments,
            })
            .collect();
        AssembledMessage {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}
