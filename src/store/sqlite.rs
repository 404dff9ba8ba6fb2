//! SQLite-backed conversation store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{not_found, ConversationStore, ConversationSummary, StoredConversation, StoredEntry};
use crate::error::{Result, ToolLoopError};
use crate::types::Role;

/// One row per conversation; entries are kept as a JSON array.
#[derive(Debug)]
pub struct SqliteConversationStore {
    connection: Mutex<Connection>,
}

fn storage(context: &'static str) -> impl FnOnce(rusqlite::Error) -> ToolLoopError {
    move |error| ToolLoopError::Storage(format!("{context}: {error}"))
}

impl SqliteConversationStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                ToolLoopError::Storage(format!("failed to create database directory: {error}"))
            })?;
        }
        let connection = Connection::open(path).map_err(storage("failed to open sqlite database"))?;
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().map_err(storage("failed to open in-memory sqlite database"))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(storage("failed to configure sqlite busy timeout"))?;
        let store = Self {
            connection: Mutex::new(connection),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| ToolLoopError::Storage("sqlite store lock poisoned".into()))
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                system_prompt TEXT,
                summary TEXT,
                turns INTEGER NOT NULL DEFAULT 0,
                entries_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_updated_at
            ON conversations(updated_at);
            ",
        )
        .map_err(storage("failed to initialize sqlite schema"))
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<StoredConversation>> {
        let row = conn
            .query_row(
                "
                SELECT id, title, system_prompt, summary, turns, entries_json, created_at, updated_at
                FROM conversations WHERE id = ?1
                ",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(storage("failed to load conversation"))?;

        let Some((id, title, system_prompt, summary, turns, entries_json, created_at, updated_at)) = row
        else {
            return Ok(None);
        };
        let entries: Vec<StoredEntry> = serde_json::from_str(&entries_json).map_err(|error| {
            ToolLoopError::Storage(format!("conversation {id} has corrupt entries: {error}"))
        })?;
        Ok(Some(StoredConversation {
            id,
            title,
            system_prompt,
            summary,
            turns: u32::try_from(turns).unwrap_or(0),
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            entries,
        }))
    }

    fn save(conn: &Connection, conversation: &StoredConversation) -> Result<()> {
        let entries_json = serde_json::to_string(&conversation.entries)?;
        conn.execute(
            "
            INSERT INTO conversations (
                id, title, system_prompt, summary, turns, entries_json, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                system_prompt = excluded.system_prompt,
                summary = excluded.summary,
                turns = excluded.turns,
                entries_json = excluded.entries_json,
                updated_at = excluded.updated_at
            ",
            params![
                &conversation.id,
                &conversation.title,
                conversation.system_prompt.as_deref(),
                conversation.summary.as_deref(),
                i64::from(conversation.turns),
                entries_json,
                format_timestamp(conversation.created_at),
                format_timestamp(conversation.updated_at),
            ],
        )
        .map_err(storage("failed to save conversation"))?;
        Ok(())
    }

    /// Load, mutate and write back one conversation.
    fn update(&self, id: &str, apply: impl FnOnce(&mut StoredConversation)) -> Result<()> {
        let conn = self.connection()?;
        let mut conversation = Self::load(&conn, id)?.ok_or_else(|| not_found(id))?;
        apply(&mut conversation);
        Self::save(&conn, &conversation)
    }

    fn summaries(&self, limit: Option<usize>) -> Result<Vec<ConversationSummary>> {
        let conn = self.connection()?;
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)).unwrap_or(-1);
        let mut statement = conn
            .prepare(
                "
                SELECT id, title, created_at, updated_at, turns, summary
                FROM conversations
                ORDER BY updated_at DESC
                LIMIT ?1
                ",
            )
            .map_err(storage("failed to prepare conversation listing"))?;
        let rows = statement
            .query_map(params![limit], summary_row)
            .map_err(storage("failed to list conversations"))?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, title, created_at, updated_at, turns, summary) =
                row.map_err(storage("failed to read conversation row"))?;
            summaries.push(ConversationSummary {
                id,
                title,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
                turns: u32::try_from(turns).unwrap_or(0),
                summary,
            });
        }
        Ok(summaries)
    }
}

type SummaryRow = (String, String, String, String, i64, Option<String>);

fn summary_row(row: &Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

/// Fixed-width so that text ordering matches time ordering.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| ToolLoopError::Storage(format!("invalid timestamp {raw:?}: {error}")))
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(&self, title: Option<&str>) -> Result<String> {
        let conversation = StoredConversation::new(title);
        let conn = self.connection()?;
        Self::save(&conn, &conversation)?;
        tracing::debug!(id = %conversation.id, "created conversation");
        Ok(conversation.id)
    }

    async fn set_system_prompt(&self, id: &str, prompt: &str) -> Result<()> {
        self.update(id, |c| c.set_system_prompt(prompt))
    }

    async fn append_message(&self, id: &str, role: Role, text: &str) -> Result<()> {
        self.update(id, |c| c.push_message(role, text))
    }

    async fn append_tool_call(
        &self,
        id: &str,
        tool_name: &str,
        arguments: &str,
        result: &str,
        is_error: bool,
    ) -> Result<()> {
        self.update(id, |c| c.push_tool_call(tool_name, arguments, result, is_error))
    }

    async fn update_summary(&self, id: &str, summary: &str) -> Result<()> {
        self.update(id, |c| c.set_summary(summary))
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<StoredConversation>> {
        let conn = self.connection()?;
        Self::load(&conn, id)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        self.summaries(Some(limit))
    }

    async fn list_all(&self) -> Result<Vec<ConversationSummary>> {
        self.summaries(None)
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn
            .execute("DELETE FROM conversations WHERE id = ?1", params![id])
            .map_err(storage("failed to delete conversation"))?;
        Ok(removed > 0)
    }
}
