//! Model service boundary and implementations.

pub mod http;
pub mod sanitize;

#[cfg(feature = "openai")]
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::aggregator::{AssembledMessage, StreamAggregator};
use crate::error::Result;
use crate::types::{ChatMessage, StreamIncrement, ToolSpec};

/// A request sent to the model service.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Arc<Vec<ToolSpec>>,
    pub stream: bool,
}

/// A hosted chat-completion service.
#[async_trait]
pub trait ModelService: Send + Sync {
    fn model_id(&self) -> &str;

    /// Open a stream of increments for one response.
    async fn stream_chat(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'static, Result<StreamIncrement>>>;

    /// Produce a whole response at once. Defaults to draining `stream_chat`.
    async fn complete_chat(&self, request: &ModelRequest) -> Result<AssembledMessage> {
        let mut stream = self.stream_chat(request).await?;
        let mut aggregator = StreamAggregator::new();
        while let Some(increment) = stream.next().await {
            aggregator.push(increment?, |_| {});
        }
        Ok(aggregator.finish())
    }
}
