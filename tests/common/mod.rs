//! Shared test helpers: a scripted model and a scripted tool provider.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use toolloop::agent_loop::{EventListener, TurnEvent, TurnEventKind};
use toolloop::error::{Result, ToolLoopError};
use toolloop::model::{ModelRequest, ModelService};
use toolloop::tools::{ToolProvider, ToolResponse};
use toolloop::types::{FinishReason, StreamIncrement, ToolCallFragment, ToolCatalogEntry};

/// One scripted model response.
pub enum Reply {
    Increments(Vec<StreamIncrement>),
    /// `stream_chat` itself fails.
    Fail(String),
    /// Yields the increments, then never ends.
    Stall(Vec<StreamIncrement>),
}

/// A model that replays queued replies and records every request.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a text answer delivered as the given deltas.
    pub fn text(self, deltas: &[&str]) -> Self {
        let mut increments: Vec<_> = deltas.iter().map(|d| StreamIncrement::text(*d)).collect();
        increments.push(StreamIncrement::finish(FinishReason::Stop));
        self.reply(Reply::Increments(increments))
    }

    /// Queue a response requesting `calls` as `(id, name, raw_arguments)`,
    /// preceded by optional text. Each call arrives as id, name and two
    /// argument fragments.
    pub fn tool_calls(self, text: Option<&str>, calls: &[(&str, &str, &str)]) -> Self {
        let mut increments = Vec::new();
        if let Some(text) = text {
            increments.push(StreamIncrement::text(text));
        }
        for (index, (id, name, args)) in calls.iter().enumerate() {
            increments.push(StreamIncrement::fragment(ToolCallFragment::id(index, *id)));
            increments.push(StreamIncrement::fragment(ToolCallFragment::name(index, *name)));
            let split = args.len() / 2;
            let split = (0..=split).rev().find(|i| args.is_char_boundary(*i)).unwrap_or(0);
            increments.push(StreamIncrement::fragment(ToolCallFragment::arguments(index, &args[..split])));
            increments.push(StreamIncrement::fragment(ToolCallFragment::arguments(index, &args[split..])));
        }
        increments.push(StreamIncrement::finish(FinishReason::ToolCalls));
        self.reply(Reply::Increments(increments))
    }

    pub fn fail(self, message: &str) -> Self {
        self.reply(Reply::Fail(message.to_string()))
    }

    pub fn stall(self, before: &[&str]) -> Self {
        let increments = before.iter().map(|d| StreamIncrement::text(*d)).collect();
        self.reply(Reply::Stall(increments))
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'static, Result<StreamIncrement>>> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Increments(vec![StreamIncrement::text("done")]));

        match reply {
            Reply::Fail(message) => Err(ToolLoopError::api(500, message)),
            Reply::Increments(increments) => {
                let stream = async_stream::stream! {
                    for increment in increments {
                        yield Ok(increment);
                    }
                };
                Ok(Box::pin(stream))
            }
            Reply::Stall(increments) => {
                let head = futures::stream::iter(increments.into_iter().map(Ok::<_, ToolLoopError>));
                Ok(head.chain(futures::stream::pending()).boxed())
            }
        }
    }
}

type Handler = Arc<dyn Fn(&str, Value) -> Result<ToolResponse> + Send + Sync>;

/// A tool provider with a fixed catalog and a scripted handler.
pub struct ScriptedProvider {
    id: String,
    tools: Vec<ToolCatalogEntry>,
    handler: Handler,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedProvider {
    /// Default handler answers `"<tool>:<arguments json>"`.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tools: Vec::new(),
            handler: Arc::new(|name, args| Ok(ToolResponse::Text(format!("{name}:{args}")))),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn tool(mut self, name: &str, description: &str) -> Self {
        self.tools.push(ToolCatalogEntry::new(
            self.id.clone(),
            name,
            description,
            serde_json::json!({"type": "object", "properties": {}}),
        ));
        self
    }

    pub fn handler(
        mut self,
        handler: impl Fn(&str, Value) -> Result<ToolResponse> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn catalog(&self) -> Vec<ToolCatalogEntry> {
        self.tools.clone()
    }
}

#[async_trait]
impl ToolProvider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolCatalogEntry>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(name, arguments)
    }
}

/// Listener that records every event it sees.
pub fn recording_listener() -> (EventListener, Arc<Mutex<Vec<TurnEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let listener: EventListener = Arc::new(move |event: &TurnEvent| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    (listener, events)
}

pub fn kinds(events: &[TurnEvent]) -> Vec<TurnEventKind> {
    events.iter().map(TurnEvent::kind).collect()
}
