//! The orchestration loop: query the model, run requested tools, repeat.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator::{AssembledMessage, LiveDelta, StreamAggregator};
use crate::conversation::{Conversation, DEFAULT_HISTORY_CAP};
use crate::error::{Result, ToolLoopError};
use crate::model::{ModelRequest, ModelService};
use crate::tools::{parse_tool_arguments, ToolDispatcher, ToolRegistry, DEFAULT_TOOL_CALL_TIMEOUT};
use crate::types::{ChatMessage, StreamIncrement, ToolCallRequest};
use crate::util::timeout::with_timeout;

use super::events::{TurnEvent, TurnEventPayload};
use super::sink::EventSink;
use super::types::{ExecutedToolCall, TurnId, TurnOutcome, TurnState, TurnStatus};

/// Tool message content for calls skipped by a cancellation.
pub const CANCELED_TOOL_RESULT: &str = "canceled";

/// Knobs for the orchestration loop.
#[derive(Debug, Clone, Builder)]
pub struct LoopSettings {
    /// Deadline for each tool invocation.
    #[builder(default = DEFAULT_TOOL_CALL_TIMEOUT)]
    pub tool_timeout: Duration,
    /// Stream model output; otherwise use whole-response completions.
    #[builder(default = true)]
    pub stream: bool,
    #[builder(default = DEFAULT_HISTORY_CAP)]
    pub history_cap: usize,
    /// Applied when a turn does not bring its own system prompt.
    pub system_prompt: Option<String>,
    /// Upper bound on model queries per turn. Unbounded when unset.
    pub max_iterations: Option<usize>,
    /// Fail the query if the model stream goes quiet this long.
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Ties the conversation, registry, dispatcher and model together for one
/// turn at a time.
pub struct Orchestrator {
    model: Arc<dyn ModelService>,
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    sink: Arc<EventSink>,
    settings: LoopSettings,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ModelService>,
        registry: Arc<ToolRegistry>,
        dispatcher: Arc<ToolDispatcher>,
        sink: Arc<EventSink>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            model,
            registry,
            dispatcher,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn model(&self) -> &Arc<dyn ModelService> {
        &self.model
    }

    /// Run one turn against `conversation`.
    ///
    /// Never fails: a model-query failure ends the turn with a
    /// `Failed` outcome whose text is the error. Messages appended before a
    /// failure or cancellation stay appended.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        query: &str,
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut turn = TurnRun::new(Uuid::new_v4(), Arc::clone(&self.sink));
        turn.emit(TurnEventPayload::Start {
            query: query.to_string(),
        });

        let system_prompt = system_prompt.or(self.settings.system_prompt.as_deref());
        conversation.add_user_message(query, system_prompt);

        loop {
            if cancel.is_cancelled() {
                return turn.finish(TurnStatus::Canceled, None);
            }
            if let Some(max) = self.settings.max_iterations {
                if turn.iterations >= max {
                    let err = ToolLoopError::InvalidState(format!(
                        "tool loop exceeded {max} iterations"
                    ));
                    return turn.fail(&err);
                }
            }
            turn.iterations += 1;

            turn.enter(TurnState::Querying);
            let request = ModelRequest {
                messages: conversation.snapshot(),
                tools: self.registry.merged_tool_specs(),
                stream: self.settings.stream,
            };
            let message = match self.query_model(&request, &turn, cancel).await {
                Ok(message) => message,
                Err(ToolLoopError::Canceled) => return turn.finish(TurnStatus::Canceled, None),
                Err(err) => return turn.fail(&err),
            };

            turn.enter(TurnState::Evaluating);
            let tool_calls = dedup_by_id(message.tool_calls);
            if !message.content.is_empty() {
                turn.segments.push(message.content.clone());
            }
            if !message.content.is_empty() || !tool_calls.is_empty() {
                conversation.add_assistant_message(ChatMessage::assistant_with_tool_calls(
                    message.content,
                    tool_calls.clone(),
                ));
                turn.appended += 1;
            }

            if tool_calls.is_empty() {
                turn.enter(TurnState::Completed);
                return turn.finish(TurnStatus::Completed, None);
            }

            turn.enter(TurnState::ExecutingTools);
            for (position, call) in tool_calls.iter().enumerate() {
                let executed = if cancel.is_cancelled() {
                    None
                } else {
                    self.execute_call(call, &turn, cancel).await
                };
                let Some(executed) = executed else {
                    for skipped in &tool_calls[position..] {
                        conversation.add_tool_result(skipped.id.clone(), CANCELED_TOOL_RESULT);
                        turn.appended += 1;
                    }
                    return turn.finish(TurnStatus::Canceled, None);
                };
                conversation.add_tool_result(executed.call_id.clone(), executed.result.clone());
                turn.appended += 1;
                turn.tool_calls.push(executed);
            }
        }
    }

    async fn query_model(
        &self,
        request: &ModelRequest,
        turn: &TurnRun,
        cancel: &CancellationToken,
    ) -> Result<AssembledMessage> {
        if !request.stream {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolLoopError::Canceled),
                message = self.model.complete_chat(request) => message?,
            };
            if !message.reasoning.is_empty() {
                turn.emit(TurnEventPayload::Thinking {
                    content: message.reasoning.clone(),
                    first: true,
                });
            }
            if !message.content.is_empty() {
                turn.emit(TurnEventPayload::AssistantMessage {
                    content: message.content.clone(),
                });
            }
            return Ok(message);
        }

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolLoopError::Canceled),
            stream = self.model.stream_chat(request) => stream?,
        };

        let mut aggregator = StreamAggregator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolLoopError::Canceled),
                next = next_increment(&mut stream, self.settings.stream_idle_timeout) => next?,
            };
            let Some(increment) = next else {
                break;
            };
            aggregator.push(increment, |delta| match delta {
                LiveDelta::Text(text) => turn.emit(TurnEventPayload::AssistantMessage {
                    content: text.to_string(),
                }),
                LiveDelta::Reasoning { text, first } => turn.emit(TurnEventPayload::Thinking {
                    content: text.to_string(),
                    first,
                }),
            });
        }
        Ok(aggregator.finish())
    }

    /// Run one requested call. `None` means the turn was canceled while the
    /// call was in flight; the call itself carries on in the background.
    async fn execute_call(
        &self,
        call: &ToolCallRequest,
        turn: &TurnRun,
        cancel: &CancellationToken,
    ) -> Option<ExecutedToolCall> {
        let Some(provider_id) = self.registry.resolve(&call.name) else {
            let error = format!(
                "Tool {} is not available from any connected tool provider",
                call.name
            );
            tracing::warn!(tool = %call.name, call_id = %call.id, "unresolved tool call");
            turn.emit(TurnEventPayload::ToolError {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                error: error.clone(),
            });
            return Some(ExecutedToolCall {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments: call.raw_arguments.clone(),
                result: error,
                is_error: true,
            });
        };

        let arguments = parse_tool_arguments(&call.raw_arguments);
        turn.emit(TurnEventPayload::ToolCall {
            call_id: call.id.clone(),
            provider_id: provider_id.clone(),
            tool_name: call.name.clone(),
            arguments: arguments.clone(),
        });

        let dispatch = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(tool = %call.name, call_id = %call.id, "tool call abandoned by cancellation");
                return None;
            }
            dispatch = self.dispatcher.invoke(&provider_id, &call.name, arguments, self.settings.tool_timeout) => dispatch,
        };

        let is_error = dispatch.outcome.is_error();
        let result = dispatch.outcome.into_text();
        if is_error {
            turn.emit(TurnEventPayload::ToolError {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                error: result.clone(),
            });
        } else {
            turn.emit(TurnEventPayload::ToolResult {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result: result.clone(),
                duration_ms: dispatch.duration.as_millis() as u64,
            });
        }

        Some(ExecutedToolCall {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.raw_arguments.clone(),
            result,
            is_error,
        })
    }
}

async fn next_increment(
    stream: &mut BoxStream<'static, Result<StreamIncrement>>,
    idle_timeout: Option<Duration>,
) -> Result<Option<StreamIncrement>> {
    match idle_timeout {
        Some(idle) => with_timeout(idle, async { stream.next().await.transpose() })
            .await
            .map_err(|err| match err {
                ToolLoopError::Timeout(ms) => {
                    ToolLoopError::Stream(format!("model stream idle for {ms}ms"))
                }
                other => other,
            }),
        None => stream.next().await.transpose(),
    }
}

/// Keep the first request for each id, preserving order.
fn dedup_by_id(calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
    let mut seen = HashSet::new();
    calls
        .into_iter()
        .filter(|call| seen.insert(call.id.clone()))
        .collect()
}

/// Per-turn bookkeeping and event numbering.
struct TurnRun {
    turn_id: TurnId,
    seq: AtomicU64,
    sink: Arc<EventSink>,
    iterations: usize,
    appended: usize,
    segments: Vec<String>,
    tool_calls: Vec<ExecutedToolCall>,
}

impl TurnRun {
    fn new(turn_id: TurnId, sink: Arc<EventSink>) -> Self {
        Self {
            turn_id,
            seq: AtomicU64::new(1),
            sink,
            iterations: 0,
            appended: 0,
            segments: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    fn emit(&self, payload: TurnEventPayload) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.sink.notify(&TurnEvent {
            turn_id: self.turn_id,
            seq,
            timestamp: chrono::Utc::now(),
            payload,
        });
    }

    fn enter(&self, state: TurnState) {
        tracing::debug!(turn_id = %self.turn_id, iteration = self.iterations, %state, "turn state");
    }

    fn fail(self, err: &ToolLoopError) -> TurnOutcome {
        tracing::warn!(turn_id = %self.turn_id, category = %err.category(), error = %err, "turn failed");
        let text = format!("Error processing query: {err}");
        self.emit(TurnEventPayload::Error {
            message: text.clone(),
        });
        self.finish(TurnStatus::Failed, Some(text))
    }

    fn finish(self, status: TurnStatus, text: Option<String>) -> TurnOutcome {
        self.emit(TurnEventPayload::Done { status });
        tracing::debug!(
            turn_id = %self.turn_id,
            %status,
            iterations = self.iterations,
            tool_calls = self.tool_calls.len(),
            "turn finished"
        );
        TurnOutcome {
            turn_id: self.turn_id,
            status,
            text: text.unwrap_or_else(|| self.segments.join("\n")),
            iterations: self.iterations,
            tool_calls: self.tool_calls,
            appended_messages: self.appended,
            finished_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let calls = vec![
            ToolCallRequest::new("a", "f", "{}"),
            ToolCallRequest::new("b", "g", "{}"),
            ToolCallRequest::new("a", "f", "{\"x\":1}"),
        ];
        let deduped = dedup_by_id(calls);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "a");
        assert_eq!(deduped[0].raw_arguments, "{}");
        assert_eq!(deduped[1].id, "b");
    }

    #[test]
    fn settings_default_to_documented_values() {
        let settings = LoopSettings::default();
        assert_eq!(settings.tool_timeout, Duration::from_secs(30));
        assert!(settings.stream);
        assert_eq!(settings.history_cap, 20);
        assert!(settings.max_iterations.is_none());
        assert!(settings.system_prompt.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_maps_to_stream_error() {
        let mut stream: BoxStream<'static, Result<StreamIncrement>> =
            futures::stream::pending().boxed();
        let err = next_increment(&mut stream, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolLoopError::Stream(message) if message.contains("5000ms")));
    }
}
