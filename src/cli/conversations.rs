//! `init` and `conversations` commands.

use std::path::Path;

use crate::config::{McpServersConfig, ToolLoopConfig};
use crate::error::{Result, ToolLoopError};
use crate::store::{ConversationStore, ConversationSummary, SqliteConversationStore, StoredEntry};

use super::{ConversationCommands, InitArgs};

/// Write a single-server `mcpServers` file.
pub fn run_init(config: &ToolLoopConfig, args: InitArgs) -> Result<()> {
    let path = config.mcp_config_path();
    write_init_config(&path, args)?;
    println!("Wrote MCP server config to {}", path.display());
    Ok(())
}

fn write_init_config(path: &Path, args: InitArgs) -> Result<()> {
    if path.exists() && !args.force {
        return Err(ToolLoopError::Configuration(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    McpServersConfig::single(args.command, args.args).save(path)
}

pub async fn run_conversations(config: &ToolLoopConfig, command: ConversationCommands) -> Result<()> {
    let store = SqliteConversationStore::open(config.database_path())?;
    match command {
        ConversationCommands::List { limit, all } => {
            let summaries = if all {
                store.list_all().await?
            } else {
                store.list_recent(limit).await?
            };
            if summaries.is_empty() {
                println!("No conversations stored.");
            }
            for summary in &summaries {
                println!("{}", format_summary(summary));
            }
        }
        ConversationCommands::Show { id } => {
            let conversation = store
                .get_conversation(&id)
                .await?
                .ok_or_else(|| ToolLoopError::Storage(format!("conversation {id} not found")))?;
            println!("{}", format_summary(&conversation.to_summary()));
            if let Some(prompt) = &conversation.system_prompt {
                println!("system: {prompt}");
            }
            for entry in &conversation.entries {
                match entry {
                    StoredEntry::Message { role, content, .. } => println!("{role}: {content}"),
                    StoredEntry::ToolCall {
                        tool_name,
                        arguments,
                        result,
                        is_error,
                        ..
                    } => {
                        let mark = if *is_error { "error" } else { "ok" };
                        println!("tool {tool_name}({arguments}) [{mark}]: {result}");
                    }
                }
            }
        }
        ConversationCommands::Delete { id } => {
            if store.delete_conversation(&id).await? {
                println!("Deleted {id}");
            } else {
                return Err(ToolLoopError::Storage(format!("conversation {id} not found")));
            }
        }
    }
    Ok(())
}

fn format_summary(summary: &ConversationSummary) -> String {
    let mut line = format!(
        "{}  {}  ({} turns, updated {})",
        summary.id,
        summary.title,
        summary.turns,
        summary.updated_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(text) = &summary.summary {
        line.push_str("\n    ");
        line.push_str(text);
    }
    line
}
