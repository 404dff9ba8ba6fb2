//! OpenAI-compatible Chat Completions client.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::aggregator::AssembledMessage;
use crate::config::ModelConfig;
use crate::error::{Result, ToolLoopError};
use crate::types::*;

use super::http::{bearer_headers, build_client, parse_sse_data, status_to_error, SseLineBuffer};
use super::sanitize::pair_tool_results;
use super::{ModelRequest, ModelService};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Some reasoning models open their answer with a bare blank line.
const LEADING_BLANK_DELTA: &str = "\n\n";

pub struct OpenAiChatService {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiChatService {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: build_client(Duration::from_secs(120))?,
        })
    }

    /// Build from configuration; an API key is required.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ToolLoopError::Configuration("OPENAI_API_KEY is not set".into())
        })?;
        Self::new(config.model.clone(), api_key, Some(config.base_url.clone()))
    }

    fn build_request_body(&self, request: &ModelRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = pair_tool_results(&request.messages)
            .iter()
            .map(message_to_openai)
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tools);
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, retry_after.as_deref(), &body_text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ModelService for OpenAiChatService {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream_chat(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'static, Result<StreamIncrement>>> {
        let body = self.build_request_body(request, true);
        debug!(model = %self.model, messages = request.messages.len(), tools = request.tools.len(), "OpenAI stream_chat");
        let resp = self.post(&body).await?;
        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::new();
            let mut seen_text = false;
            futures::pin_mut!(byte_stream);

            'read: while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ToolLoopError::Network(e));
                        break;
                    }
                };

                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            yield Err(e);
                            break 'read;
                        }
                    };
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = parse_sse_data(&line) else {
                        continue;
                    };
                    if let Some(message) = stream_error_message(data) {
                        yield Err(ToolLoopError::Stream(message));
                        break 'read;
                    }
                    match serde_json::from_str::<OpenAiStreamChunk>(data) {
                        Ok(chunk) => {
                            if let Some(mut increment) = chunk_to_increment(chunk) {
                                if let Some(text) = increment.text.take() {
                                    if seen_text || text != LEADING_BLANK_DELTA {
                                        seen_text |= !text.is_empty();
                                        increment.text = Some(text);
                                    }
                                }
                                yield Ok(increment);
                            }
                        }
                        Err(e) => debug!(error = %e, "skipping unparsable stream chunk"),
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete_chat(&self, request: &ModelRequest) -> Result<AssembledMessage> {
        let body = self.build_request_body(request, false);
        debug!(model = %self.model, "OpenAI complete_chat");
        let resp = self.post(&body).await?;

        let data: OpenAiChatResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ToolLoopError::api(200, "No choices in OpenAI response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        Ok(AssembledMessage {
            content: choice.message.content.unwrap_or_default(),
            reasoning: choice.message.reasoning_content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
        })
    }
}

fn chunk_to_increment(chunk: OpenAiStreamChunk) -> Option<StreamIncrement> {
    let choice = chunk.choices.into_iter().next()?;
    let tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallFragment {
            index: tc.index,
            id: tc.id,
            name: tc.function.as_ref().and_then(|f| f.name.clone()),
            arguments: tc.function.and_then(|f| f.arguments),
        })
        .collect();
    Some(StreamIncrement {
        text: choice.delta.content,
        reasoning: choice.delta.reasoning_content,
        tool_calls,
        finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
    })
}

/// Error payloads some compatible servers send mid-stream.
fn stream_error_message(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    let error = value.get("error")?;
    Some(
        error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

fn message_to_openai(msg: &ChatMessage) -> serde_json::Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.text(),
        }),
        Role::Assistant if msg.has_tool_calls() => {
            let tool_calls: Vec<serde_json::Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.raw_arguments,
                        }
                    })
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": msg.content,
                "tool_calls": tool_calls,
            })
        }
        role => serde_json::json!({ "role": role.as_ref(), "content": msg.text() }),
    }
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiStreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
