//! The session: one explicit context object owning everything a turn needs.

use std::sync::Arc;

use bon::bon;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_loop::{
    channel_listener, EventSink, LoopSettings, Orchestrator, TurnEvent, TurnOutcome, TurnStatus,
};
use crate::config::ToolLoopConfig;
use crate::conversation::Conversation;
use crate::error::{Result, ToolLoopError};
use crate::model::ModelService;
use crate::store::{not_found, ConversationStore, StoredEntry};
use crate::tools::history::DEFAULT_TOOL_HISTORY_LIMIT;
use crate::tools::{ToolDispatcher, ToolHistory, ToolProvider, ToolRegistry};
use crate::types::{ChatMessage, Role};

struct SessionState {
    conversation: Conversation,
    /// Store id, assigned by the first turn that persists anything.
    conversation_id: Option<String>,
    /// System prompt last written to the stored conversation.
    stored_prompt: Option<String>,
}

/// Conversation, tool routing, event sink and store for one interactive
/// session. Turns run one at a time.
pub struct Session {
    orchestrator: Orchestrator,
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    history: Arc<ToolHistory>,
    sink: Arc<EventSink>,
    store: Option<Arc<dyn ConversationStore>>,
    state: Mutex<SessionState>,
}

#[bon]
impl Session {
    #[builder]
    pub fn new(
        model: Arc<dyn ModelService>,
        #[builder(default)] settings: LoopSettings,
        store: Option<Arc<dyn ConversationStore>>,
        #[builder(default = DEFAULT_TOOL_HISTORY_LIMIT)] tool_history_limit: usize,
    ) -> Self {
        let registry = Arc::new(ToolRegistry::new());
        let history = Arc::new(ToolHistory::new(tool_history_limit));
        let dispatcher = Arc::new(ToolDispatcher::new(Arc::clone(&history)));
        let sink = Arc::new(EventSink::new());
        let conversation = Conversation::with_cap(settings.history_cap);
        let orchestrator = Orchestrator::new(
            model,
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::clone(&sink),
            settings,
        );
        Self {
            orchestrator,
            registry,
            dispatcher,
            history,
            sink,
            store,
            state: Mutex::new(SessionState {
                conversation,
                conversation_id: None,
                stored_prompt: None,
            }),
        }
    }
}

impl Session {
    /// Build a session from typed configuration.
    pub fn from_config(
        config: &ToolLoopConfig,
        model: Arc<dyn ModelService>,
        store: Option<Arc<dyn ConversationStore>>,
    ) -> Self {
        Self::builder()
            .model(model)
            .settings(config.loop_settings())
            .tool_history_limit(config.tool_history_limit)
            .maybe_store(store)
            .build()
    }

    /// Attach a ready provider: its catalog is merged into the registry and
    /// its calls are routed through the dispatcher. Returns the number of
    /// tools it now owns.
    pub async fn add_provider(&self, provider: Arc<dyn ToolProvider>) -> Result<usize> {
        let entries = provider.list_tools().await?;
        let owned = self.registry.register_provider_catalog(provider.id(), entries);
        tracing::info!(provider = %provider.id(), tools = owned, "registered tool provider");
        self.dispatcher.register(provider);
        Ok(owned)
    }

    /// Run one turn and return its final text (or error string).
    pub async fn process_query(
        &self,
        query: &str,
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> String {
        self.run_turn(query, system_prompt, cancel).await.text
    }

    /// Run one turn and return the full outcome.
    pub async fn run_turn(
        &self,
        query: &str,
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut state = self.state.lock().await;
        self.run_locked(&mut state, query, system_prompt, cancel).await
    }

    /// Run a turn in the background with a channel listener installed for
    /// its duration. The previous listener is restored when the turn ends.
    pub fn start_turn(
        self: &Arc<Self>,
        query: impl Into<String>,
        system_prompt: Option<String>,
    ) -> TurnHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = Arc::clone(self);
        let token = cancel.clone();
        let query = query.into();

        let task = tokio::spawn(async move {
            let mut state = session.state.lock().await;
            let _listener = session.sink.scoped(channel_listener(tx));
            session
                .run_locked(&mut state, &query, system_prompt.as_deref(), &token)
                .await
        });

        TurnHandle {
            events,
            cancel,
            task: Some(task),
        }
    }

    async fn run_locked(
        &self,
        state: &mut SessionState,
        query: &str,
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let outcome = self
            .orchestrator
            .run_turn(&mut state.conversation, query, system_prompt, cancel)
            .await;
        if outcome.appended_messages > 0 {
            if let Some(store) = &self.store {
                if let Err(err) = persist_turn(store.as_ref(), state, query, &outcome).await {
                    tracing::warn!(category = %err.category(), error = %err, "failed to persist turn");
                }
            }
        }
        outcome
    }

    /// Reset the conversation (keeping its system prompt) and forget the
    /// store id, so the next turn starts a new stored conversation.
    pub async fn clear_conversation(&self) {
        let mut state = self.state.lock().await;
        state.conversation.clear();
        state.conversation_id = None;
        state.stored_prompt = None;
    }

    /// Load a stored conversation and continue it.
    ///
    /// System prompt, user and assistant texts are restored; tool entries
    /// are not replayed.
    pub async fn resume_conversation(&self, id: &str) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| ToolLoopError::InvalidState("session has no conversation store".into()))?;
        let stored = store
            .get_conversation(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let mut conversation = Conversation::with_cap(self.orchestrator.settings().history_cap);
        for entry in &stored.entries {
            if let StoredEntry::Message { role, content, .. } = entry {
                match role {
                    Role::User => {
                        conversation.add_user_message(content.clone(), stored.system_prompt.as_deref());
                    }
                    Role::Assistant => {
                        conversation.add_assistant_message(ChatMessage::assistant(content.clone()));
                    }
                    Role::System | Role::Tool => {}
                }
            }
        }

        let mut state = self.state.lock().await;
        state.conversation = conversation;
        state.conversation_id = Some(stored.id);
        state.stored_prompt = stored.system_prompt;
        Ok(())
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.conversation.snapshot()
    }

    pub async fn conversation_id(&self) -> Option<String> {
        self.state.lock().await.conversation_id.clone()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn tool_history(&self) -> &Arc<ToolHistory> {
        &self.history
    }

    pub fn sink(&self) -> &Arc<EventSink> {
        &self.sink
    }

    pub fn store(&self) -> Option<&Arc<dyn ConversationStore>> {
        self.store.as_ref()
    }

    pub fn settings(&self) -> &LoopSettings {
        self.orchestrator.settings()
    }

    pub fn model_id(&self) -> &str {
        self.orchestrator.model().model_id()
    }
}

/// Write one finished turn, creating the stored conversation on first use.
async fn persist_turn(
    store: &dyn ConversationStore,
    state: &mut SessionState,
    query: &str,
    outcome: &TurnOutcome,
) -> Result<()> {
    let id = match &state.conversation_id {
        Some(id) => id.clone(),
        None => {
            let id = store.create_conversation(None).await?;
            tracing::debug!(conversation_id = %id, "started stored conversation");
            state.conversation_id = Some(id.clone());
            id
        }
    };

    if let Some(prompt) = state.conversation.system_prompt() {
        if state.stored_prompt.as_deref() != Some(prompt) {
            store.set_system_prompt(&id, prompt).await?;
            state.stored_prompt = Some(prompt.to_string());
        }
    }

    store.append_message(&id, Role::User, query).await?;
    for call in &outcome.tool_calls {
        store
            .append_tool_call(&id, &call.tool_name, &call.arguments, &call.result, call.is_error)
            .await?;
    }
    if outcome.status == TurnStatus::Completed && !outcome.text.is_empty() {
        store.append_message(&id, Role::Assistant, &outcome.text).await?;
    }
    Ok(())
}

/// A turn running in the background. Dropping the handle without calling
/// [`TurnHandle::wait`] cancels the turn.
pub struct TurnHandle {
    events: mpsc::UnboundedReceiver<TurnEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<TurnOutcome>>,
}

impl TurnHandle {
    /// Next event, or `None` once the turn has finished and all events were
    /// drained.
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }

    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<TurnEvent> {
        &mut self.events
    }

    /// Request cancellation. The turn stops at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(mut self) -> Result<TurnOutcome> {
        let task = self
            .task
            .take()
            .ok_or_else(|| ToolLoopError::InvalidState("turn already awaited".into()))?;
        task.await
            .map_err(|err| ToolLoopError::InvalidState(format!("turn task failed: {err}")))
    }
}

impl Drop for TurnHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}
