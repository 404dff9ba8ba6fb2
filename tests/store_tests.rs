#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use toolloop::store::{ConversationStore, SqliteConversationStore, StoredEntry};
use toolloop::types::Role;

#[tokio::test]
async fn conversations_survive_reopening() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("conversations.db");

    let id = {
        let store = SqliteConversationStore::open(&path).unwrap();
        let id = store.create_conversation(Some("Disk usage")).await.unwrap();
        store.set_system_prompt(&id, "You manage files.").await.unwrap();
        store.append_message(&id, Role::User, "How big is /var?").await.unwrap();
        store
            .append_tool_call(&id, "du", r#"{"path":"/var"}"#, "2.1G", false)
            .await
            .unwrap();
        store.append_message(&id, Role::Assistant, "About 2.1 GB.").await.unwrap();
        id
    };

    let store = SqliteConversationStore::open(&path).unwrap();
    let stored = store.get_conversation(&id).await.unwrap().unwrap();

    assert_eq!(stored.title, "Disk usage");
    assert_eq!(stored.system_prompt.as_deref(), Some("You manage files."));
    assert_eq!(stored.turns, 1);
    assert_eq!(stored.entries.len(), 3);
    assert!(matches!(
        &stored.entries[1],
        StoredEntry::ToolCall { tool_name, result, is_error: false, .. } if tool_name == "du" && result == "2.1G"
    ));
    assert!(stored.updated_at >= stored.created_at);
}

#[tokio::test]
async fn listing_is_most_recent_first() {
    let store = SqliteConversationStore::open_in_memory().unwrap();
    let older = store.create_conversation(Some("older")).await.unwrap();
    let newer = store.create_conversation(Some("newer")).await.unwrap();
    let middle = store.create_conversation(Some("middle")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.append_message(&newer, Role::User, "bump").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.append_message(&older, Role::User, "bump again").await.unwrap();

    let recent = store.list_recent(2).await.unwrap();
    let titles: Vec<&str> = recent.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["older", "newer"]);

    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].id, middle);
}

#[tokio::test]
async fn summary_and_delete() {
    let store = SqliteConversationStore::open_in_memory().unwrap();
    let id = store.create_conversation(None).await.unwrap();

    store.update_summary(&id, "Talked about logs.").await.unwrap();
    let summary = &store.list_recent(10).await.unwrap()[0];
    assert_eq!(summary.summary.as_deref(), Some("Talked about logs."));
    assert!(summary.title.starts_with("Conversation "));

    assert!(store.delete_conversation(&id).await.unwrap());
    assert!(!store.delete_conversation(&id).await.unwrap());
    assert!(store.get_conversation(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn writes_to_unknown_conversation_fail() {
    let store = SqliteConversationStore::open_in_memory().unwrap();

    let err = store
        .append_message("nope", Role::User, "hello")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("nope"));
}
