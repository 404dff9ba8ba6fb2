//! Session behaviour: persistence, listener scoping, background turns.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{kinds, recording_listener, ScriptedModel, ScriptedProvider};
use toolloop::agent_loop::{LoopSettings, TurnEventKind, TurnStatus};
use toolloop::error::ToolLoopError;
use toolloop::session::Session;
use toolloop::store::{ConversationStore, InMemoryConversationStore, StoredEntry};
use toolloop::types::Role;

fn session_with_store(model: ScriptedModel, store: Arc<InMemoryConversationStore>) -> Arc<Session> {
    Arc::new(
        Session::builder()
            .model(Arc::new(model))
            .store(store)
            .build(),
    )
}

fn entry_roles(entries: &[StoredEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| match entry {
            StoredEntry::Message { role, .. } => role.to_string(),
            StoredEntry::ToolCall { tool_name, .. } => format!("tool:{tool_name}"),
        })
        .collect()
}

#[tokio::test]
async fn conversation_id_is_assigned_by_first_persisted_turn() {
    let store = Arc::new(InMemoryConversationStore::new());
    let session = session_with_store(ScriptedModel::new().text(&["hello"]), Arc::clone(&store));
    assert_eq!(session.conversation_id().await, None);

    let answer = session
        .process_query("hi", None, &CancellationToken::new())
        .await;

    assert_eq!(answer, "hello");
    let id = session.conversation_id().await.unwrap();
    let stored = store.get_conversation(&id).await.unwrap().unwrap();
    assert_eq!(entry_roles(&stored.entries), vec!["user", "assistant"]);
    assert_eq!(stored.turns, 1);
}

#[tokio::test]
async fn tool_turn_is_persisted_once_with_system_prompt() {
    let store = Arc::new(InMemoryConversationStore::new());
    let model = ScriptedModel::new()
        .tool_calls(None, &[("c1", "list_dir", r#"{"path":"/"}"#)])
        .text(&["Root has three entries."]);
    let session = session_with_store(model, Arc::clone(&store));
    session
        .add_provider(Arc::new(ScriptedProvider::new("fs").tool("list_dir", "List")))
        .await
        .unwrap();

    let outcome = session
        .run_turn("ls /", Some("You are a shell helper."), &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, TurnStatus::Completed);
    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    let stored = store.get_conversation(&all[0].id).await.unwrap().unwrap();
    assert_eq!(stored.system_prompt.as_deref(), Some("You are a shell helper."));
    assert_eq!(
        entry_roles(&stored.entries),
        vec!["user", "tool:list_dir", "assistant"]
    );
    match &stored.entries[1] {
        StoredEntry::ToolCall {
            arguments,
            result,
            is_error,
            ..
        } => {
            assert_eq!(arguments, r#"{"path":"/"}"#);
            assert_eq!(result, r#"list_dir:{"path":"/"}"#);
            assert!(!is_error);
        }
        other => panic!("unexpected entry: {other:?}"),
    }
}

#[tokio::test]
async fn turns_share_an_id_until_cleared() {
    let store = Arc::new(InMemoryConversationStore::new());
    let model = ScriptedModel::new().text(&["one"]).text(&["two"]).text(&["three"]);
    let session = session_with_store(model, Arc::clone(&store));
    let cancel = CancellationToken::new();

    session.process_query("first", None, &cancel).await;
    let first_id = session.conversation_id().await.unwrap();
    session.process_query("second", None, &cancel).await;
    assert_eq!(session.conversation_id().await.as_deref(), Some(first_id.as_str()));

    session.clear_conversation().await;
    assert_eq!(session.conversation_id().await, None);
    assert!(session.messages().await.is_empty());

    session.process_query("third", None, &cancel).await;
    let second_id = session.conversation_id().await.unwrap();
    assert_ne!(first_id, second_id);

    let first = store.get_conversation(&first_id).await.unwrap().unwrap();
    assert_eq!(first.turns, 2);
    assert_eq!(store.list_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_turn_without_messages_is_not_persisted() {
    let store = Arc::new(InMemoryConversationStore::new());
    let session = session_with_store(ScriptedModel::new().fail("down"), Arc::clone(&store));

    let outcome = session
        .run_turn("hi", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, TurnStatus::Failed);
    assert_eq!(session.conversation_id().await, None);
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_turn_after_tools_keeps_tool_entries_only() {
    let store = Arc::new(InMemoryConversationStore::new());
    let model = ScriptedModel::new()
        .tool_calls(Some("checking"), &[("c1", "list_dir", "{}")])
        .fail("down");
    let session = session_with_store(model, Arc::clone(&store));
    session
        .add_provider(Arc::new(ScriptedProvider::new("fs").tool("list_dir", "List")))
        .await
        .unwrap();

    let outcome = session
        .run_turn("ls", None, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, TurnStatus::Failed);
    let id = session.conversation_id().await.unwrap();
    let stored = store.get_conversation(&id).await.unwrap().unwrap();
    assert_eq!(entry_roles(&stored.entries), vec!["user", "tool:list_dir"]);
}

#[tokio::test]
async fn session_without_store_still_runs_turns() {
    let session = Session::builder()
        .model(Arc::new(ScriptedModel::new().text(&["fine"])))
        .build();

    let answer = session
        .process_query("hi", None, &CancellationToken::new())
        .await;

    assert_eq!(answer, "fine");
    assert_eq!(session.conversation_id().await, None);
    assert_eq!(session.messages().await.len(), 2);
}

#[tokio::test]
async fn start_turn_streams_events_and_restores_listener() {
    let session = session_with_store(
        ScriptedModel::new().text(&["a", "b"]).text(&["c"]),
        Arc::new(InMemoryConversationStore::new()),
    );
    let (listener, recorded) = recording_listener();
    session.sink().set_listener(Some(listener));

    let mut handle = session.start_turn("hi", None);
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.text, "ab");
    assert_eq!(
        kinds(&events),
        vec![
            TurnEventKind::Start,
            TurnEventKind::AssistantMessage,
            TurnEventKind::AssistantMessage,
            TurnEventKind::Done,
        ]
    );
    assert!(recorded.lock().unwrap().is_empty());

    session
        .run_turn("again", None, &CancellationToken::new())
        .await;
    assert_eq!(recorded.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn start_turn_can_be_canceled() {
    let session = session_with_store(
        ScriptedModel::new().stall(&["thinking about it"]),
        Arc::new(InMemoryConversationStore::new()),
    );

    let mut handle = session.start_turn("hi", None);
    let mut seen = Vec::new();
    while let Some(event) = handle.next_event().await {
        if event.kind() == TurnEventKind::AssistantMessage {
            handle.cancel();
        }
        seen.push(event.kind());
    }
    let outcome = handle.wait().await.unwrap();

    assert_eq!(outcome.status, TurnStatus::Canceled);
    assert_eq!(seen.last(), Some(&TurnEventKind::Done));
    assert_eq!(session.conversation_id().await, None);
}

#[tokio::test]
async fn resume_restores_stored_conversation() {
    let store = Arc::new(InMemoryConversationStore::new());
    let first = session_with_store(ScriptedModel::new().text(&["Paris."]), Arc::clone(&store));
    first
        .run_turn("Capital of France?", Some("Answer briefly."), &CancellationToken::new())
        .await;
    let id = first.conversation_id().await.unwrap();

    let second = session_with_store(ScriptedModel::new().text(&["Berlin."]), Arc::clone(&store));
    second.resume_conversation(&id).await.unwrap();

    let messages = second.messages().await;
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(messages[0].text(), "Answer briefly.");
    assert_eq!(messages[2].text(), "Paris.");
    assert_eq!(second.conversation_id().await.as_deref(), Some(id.as_str()));

    second
        .process_query("And Germany?", None, &CancellationToken::new())
        .await;
    let stored = store.get_conversation(&id).await.unwrap().unwrap();
    assert_eq!(stored.turns, 2);
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn changed_system_prompt_is_stored_and_resumed() {
    let store = Arc::new(InMemoryConversationStore::new());
    let session = session_with_store(
        ScriptedModel::new().text(&["one"]).text(&["two"]),
        Arc::clone(&store),
    );
    let cancel = CancellationToken::new();

    session.run_turn("first", Some("Be brief."), &cancel).await;
    let id = session.conversation_id().await.unwrap();
    session.run_turn("second", Some("Be thorough."), &cancel).await;

    let stored = store.get_conversation(&id).await.unwrap().unwrap();
    assert_eq!(stored.system_prompt.as_deref(), Some("Be thorough."));

    let resumed = session_with_store(ScriptedModel::new(), Arc::clone(&store));
    resumed.resume_conversation(&id).await.unwrap();
    assert_eq!(resumed.messages().await[0].text(), "Be thorough.");
}

#[tokio::test]
async fn resume_requires_a_known_conversation() {
    let without_store = Session::builder()
        .model(Arc::new(ScriptedModel::new()))
        .build();
    let err = without_store.resume_conversation("x").await.unwrap_err();
    assert!(matches!(err, ToolLoopError::InvalidState(_)));

    let with_store = session_with_store(ScriptedModel::new(), Arc::new(InMemoryConversationStore::new()));
    let err = with_store.resume_conversation("missing").await.unwrap_err();
    assert!(matches!(err, ToolLoopError::Storage(message) if message.contains("missing")));
}

#[tokio::test]
async fn add_provider_reports_owned_tools_and_collisions() {
    let session = Session::builder()
        .model(Arc::new(ScriptedModel::new()))
        .settings(LoopSettings::default())
        .build();

    let fs = ScriptedProvider::new("fs").tool("read_file", "Read").tool("list_dir", "List");
    let git = ScriptedProvider::new("git").tool("read_file", "Read blob").tool("git_log", "Log");

    assert_eq!(session.add_provider(Arc::new(fs)).await.unwrap(), 2);
    assert_eq!(session.add_provider(Arc::new(git)).await.unwrap(), 1);

    let registry = session.registry();
    assert_eq!(registry.resolve("read_file").as_deref(), Some("fs"));
    assert_eq!(registry.resolve("git_log").as_deref(), Some("git"));
    let collisions = registry.collisions();
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].rejected, "git");
}

#[tokio::test]
async fn dropping_the_handle_cancels_the_turn() {
    let session = session_with_store(
        ScriptedModel::new().stall(&["still going"]),
        Arc::new(InMemoryConversationStore::new()),
    );

    let mut handle = session.start_turn("hi", None);
    let first = handle.next_event().await.unwrap();
    assert_eq!(first.kind(), TurnEventKind::Start);
    drop(handle);

    let messages = tokio::time::timeout(std::time::Duration::from_secs(5), session.messages())
        .await
        .expect("turn should release the session after cancellation");
    assert_eq!(messages.len(), 1);
}
