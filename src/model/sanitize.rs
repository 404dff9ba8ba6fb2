//! Transcript sanitization before a request leaves the process.

use std::collections::HashSet;

use crate::types::{ChatMessage, Role};

const MISSING_RESULT: &str = "Error: no result was recorded for this tool call";

/// Pair every tool result with the assistant call that requested it.
///
/// Tool messages whose call is no longer in the transcript (for example after
/// history trimming) are dropped. Assistant calls with no result get a
/// synthetic error result so the transcript stays well-formed.
pub fn pair_tool_results(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len());
    let mut i = 0usize;

    while i < messages.len() {
        let msg = &messages[i];
        if msg.role == Role::Tool {
            i += 1;
            continue;
        }
        out.push(msg.clone());
        i += 1;
        if msg.role != Role::Assistant || !msg.has_tool_calls() {
            continue;
        }

        let requested: Vec<&str> = msg.tool_calls.iter().map(|c| c.id.as_str()).collect();
        let mut answered: HashSet<String> = HashSet::new();
        while i < messages.len() && messages[i].role == Role::Tool {
            let result = &messages[i];
            if let Some(id) = result.tool_call_id.as_deref() {
                if requested.contains(&id) && answered.insert(id.to_string()) {
                    out.push(result.clone());
                }
            }
            i += 1;
        }
        for id in requested {
            if !answered.contains(id) {
                out.push(ChatMessage::tool_result(id, MISSING_RESULT));
            }
        }
    }

    out
}
