//! Tool dispatcher: one deadline-bounded call to the provider owning a tool.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::history::{CallCompletion, ToolHistory};
use super::provider::ToolProvider;
use crate::error::ToolLoopError;
use crate::util::timeout::with_timeout;

/// Default per-call deadline.
pub const DEFAULT_TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How one dispatched call ended. Every variant carries the text the model
/// should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success(String),
    TimedOut(String),
    Failed(String),
}

impl DispatchOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Success(text) | Self::TimedOut(text) | Self::Failed(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Success(text) | Self::TimedOut(text) | Self::Failed(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Success(_))
    }
}

/// Result of [`ToolDispatcher::invoke`].
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub record_id: Uuid,
    pub outcome: DispatchOutcome,
    pub duration: Duration,
}

/// Text returned to the model when a call exceeds its deadline.
pub fn timeout_message(deadline: Duration) -> String {
    format!(
        "Execution timed out (>{}s). For long-running commands, consider adding a timeout or running them in the background.",
        deadline.as_secs()
    )
}

/// Routes calls to registered providers and records every invocation.
pub struct ToolDispatcher {
    providers: RwLock<HashMap<String, Arc<dyn ToolProvider>>>,
    history: Arc<ToolHistory>,
}

impl ToolDispatcher {
    pub fn new(history: Arc<ToolHistory>) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            history,
        }
    }

    /// Attach a provider under its id, replacing any previous one.
    pub fn register(&self, provider: Arc<dyn ToolProvider>) {
        let id = provider.id().to_string();
        self.providers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, provider);
    }

    pub fn provider(&self, provider_id: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(provider_id)
            .cloned()
    }

    pub fn history(&self) -> &Arc<ToolHistory> {
        &self.history
    }

    /// Invoke `tool_name` on `provider_id` under `deadline`.
    ///
    /// Never fails: timeouts and provider errors come back as text. The call
    /// runs on its own task, so dropping the returned future (for example on
    /// cancellation) lets the call finish or time out in the background and
    /// still complete its history record.
    pub async fn invoke(
        &self,
        provider_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
        deadline: Duration,
    ) -> Dispatch {
        let record_id = self.history.start(provider_id, tool_name, arguments.clone());
        let history = Arc::clone(&self.history);
        let provider = self.provider(provider_id);
        let provider_id = provider_id.to_string();
        let tool_name = tool_name.to_string();

        let call = tokio::spawn(async move {
            let started = Instant::now();
            let result = match provider {
                Some(provider) => {
                    with_timeout(deadline, provider.call_tool(&tool_name, arguments)).await
                }
                None => Err(ToolLoopError::provider(
                    provider_id.clone(),
                    "no connected provider with this id",
                )),
            };
            let duration = started.elapsed();

            let outcome = match result {
                Ok(response) => DispatchOutcome::Success(response.into_text()),
                Err(ToolLoopError::Timeout(_)) => DispatchOutcome::TimedOut(timeout_message(deadline)),
                Err(err) => DispatchOutcome::Failed(format!("Error: {err}")),
            };
            let completion = match &outcome {
                DispatchOutcome::Success(text) => CallCompletion::Success(text.clone()),
                other => CallCompletion::Failure(other.text().to_string()),
            };
            history.complete(record_id, completion, duration.as_millis() as u64);
            tracing::debug!(
                provider = %provider_id,
                tool = %tool_name,
                duration_ms = duration.as_millis() as u64,
                is_error = outcome.is_error(),
                "tool call finished"
            );
            (outcome, duration)
        });

        match call.await {
            Ok((outcome, duration)) => Dispatch {
                record_id,
                outcome,
                duration,
            },
            Err(join_err) => {
                let message = format!("Error: tool task failed: {join_err}");
                self.history
                    .complete(record_id, CallCompletion::Failure(message.clone()), 0);
                Dispatch {
                    record_id,
                    outcome: DispatchOutcome::Failed(message),
                    duration: Duration::ZERO,
                }
            }
        }
    }
}
