//! `chat` and `ask`: session bootstrap, turn rendering and the REPL.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent_loop::{TurnEvent, TurnEventPayload, TurnOutcome};
use crate::config::{McpServersConfig, ToolLoopConfig};
use crate::error::Result;
use crate::mcp::{self, McpToolProvider};
use crate::model::openai::OpenAiChatService;
use crate::session::Session;
use crate::store::{ConversationStore, SqliteConversationStore};
use crate::tools::{EnablementMode, ToolProvider, ToolRegistry};
use crate::types::Role;

use super::{AskArgs, ChatArgs};

const PREVIEW_CHARS: usize = 200;
const HISTORY_PREVIEW: usize = 10;

/// A session plus the MCP servers backing it.
pub struct ChatRuntime {
    pub session: Arc<Session>,
    servers: Vec<Arc<McpToolProvider>>,
}

impl ChatRuntime {
    /// Connect everything described by `config`.
    ///
    /// A missing conversation database or MCP config degrades to a session
    /// without persistence or tools, with a warning.
    pub async fn connect(config: &ToolLoopConfig) -> Result<Self> {
        let model = Arc::new(OpenAiChatService::from_config(&config.model)?);
        let store = open_store(config);
        let session = Arc::new(Session::from_config(config, model, store));

        let servers_config = McpServersConfig::load(&config.mcp_config_path())?;
        let servers = if servers_config.is_empty() {
            tracing::warn!(
                path = %config.mcp_config_path().display(),
                "no MCP servers configured; run `toolloop init` to create a config"
            );
            Vec::new()
        } else {
            mcp::connect_all(&servers_config).await?
        };

        for server in &servers {
            if let Err(err) = session.add_provider(server.clone()).await {
                tracing::warn!(server = %server.id(), error = %err, "failed to list tools");
            }
        }
        for collision in session.registry().collisions() {
            tracing::warn!(
                tool = %collision.name,
                owner = %collision.owner,
                ignored = %collision.rejected,
                "tool advertised by more than one server"
            );
        }

        Ok(Self { session, servers })
    }

    pub async fn shutdown(self) {
        for server in &self.servers {
            server.shutdown().await;
        }
    }
}

/// Open the SQLite store, or run without persistence if that fails.
pub fn open_store(config: &ToolLoopConfig) -> Option<Arc<dyn ConversationStore>> {
    let path = config.database_path();
    match SqliteConversationStore::open(&path) {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "conversation store unavailable");
            None
        }
    }
}

pub async fn run_ask(mut config: ToolLoopConfig, args: AskArgs) -> Result<()> {
    if args.system.is_some() {
        config.system_prompt = args.system;
    }
    let runtime = ChatRuntime::connect(&config).await?;
    let outcome = run_turn_interactive(&runtime.session, &args.prompt, None).await?;
    finish_output(&outcome);
    runtime.shutdown().await;
    Ok(())
}

pub async fn run_chat(mut config: ToolLoopConfig, args: ChatArgs) -> Result<()> {
    if args.no_stream {
        config.stream = false;
    }
    if args.system.is_some() {
        config.system_prompt = args.system;
    }
    let runtime = ChatRuntime::connect(&config).await?;
    let session = Arc::clone(&runtime.session);

    println!("toolloop chat ({})", session.model_id());
    println!(
        "Type your question, or: servers, tools, enable <tool|all>, disable <tool|all>, \
         mode <all|selective>, history, message history, clear history, quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => break,
            "servers" => print_servers(&session),
            "tools" => print_tools(&session),
            "history" => print_tool_history(&session),
            "message history" => print_messages(&session).await,
            "clear history" => {
                session.clear_conversation().await;
                println!("Conversation cleared.");
            }
            _ => {
                if let Some(command) = ToolCommand::parse(line) {
                    println!("{}", command.apply(session.registry()));
                    continue;
                }
                let outcome = run_turn_interactive(&session, line, None).await?;
                finish_output(&outcome);
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}

/// Run a turn, rendering its events live. Ctrl-C cancels the turn.
pub async fn run_turn_interactive(
    session: &Arc<Session>,
    query: &str,
    system_prompt: Option<String>,
) -> Result<TurnOutcome> {
    let mut handle = session.start_turn(query, system_prompt);
    let renderer = EventRenderer::new(session.settings().stream);
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => renderer.render(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n[canceling turn]");
                handle.cancel();
            }
        }
    }
    handle.wait().await
}

fn finish_output(outcome: &TurnOutcome) {
    if !outcome.is_completed() {
        eprintln!("[turn {}]", outcome.status);
    }
    println!();
}

/// Prints turn events to the terminal.
struct EventRenderer {
    streaming: bool,
}

impl EventRenderer {
    fn new(streaming: bool) -> Self {
        Self { streaming }
    }

    fn render(&self, event: &TurnEvent) {
        match &event.payload {
            TurnEventPayload::AssistantMessage { content } => {
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            TurnEventPayload::Thinking { content, first } => {
                if *first {
                    eprint!("\n[thinking] ");
                }
                eprint!("{content}");
                if !self.streaming {
                    eprintln!();
                }
            }
            TurnEventPayload::ToolCall {
                tool_name,
                provider_id,
                arguments,
                ..
            } => {
                eprintln!("\n⚡ {tool_name} [{provider_id}] {}", preview(&arguments.to_string()));
            }
            TurnEventPayload::ToolResult {
                result,
                duration_ms,
                ..
            } => {
                eprintln!("  ✅ ({duration_ms}ms) {}", preview(result));
            }
            TurnEventPayload::ToolError { error, .. } => {
                eprintln!("  ❌ {}", preview(error));
            }
            TurnEventPayload::Error { message } => {
                eprintln!("\n❌ {message}");
            }
            TurnEventPayload::Start { .. } | TurnEventPayload::Done { .. } => {}
        }
    }
}

/// Cut `text` to at most [`PREVIEW_CHARS`] bytes on a char boundary.
fn preview(text: &str) -> String {
    if text.len() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut end = PREVIEW_CHARS;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn print_servers(session: &Session) {
    let providers = session.registry().providers();
    if providers.is_empty() {
        println!("No MCP servers connected.");
        return;
    }
    for provider in providers {
        let tools = session.registry().provider_catalog(&provider);
        println!("{provider}: {} tools", tools.len());
    }
}

fn print_tools(session: &Session) {
    let registry = session.registry();
    println!("Mode: {}", registry.mode());
    for entry in registry.catalog() {
        let mark = if registry.is_enabled(&entry.name) { "x" } else { " " };
        println!("[{mark}] {} ({}) {}", entry.name, entry.provider_id, entry.description);
    }
}

/// REPL commands that change which tools are offered to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ToolCommand {
    Enable(String),
    Disable(String),
    EnableAll,
    DisableAll,
    Mode(EnablementMode),
    Invalid(String),
}

impl ToolCommand {
    /// Returns None when `line` is not a tool command, so it is sent as a query.
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?.to_ascii_lowercase();
        let target = words.next();
        if words.next().is_some() {
            return None;
        }
        let command = match (verb.as_str(), target) {
            ("enable", Some(t)) if t.eq_ignore_ascii_case("all") => Self::EnableAll,
            ("disable", Some(t)) if t.eq_ignore_ascii_case("all") => Self::DisableAll,
            ("enable", Some(name)) => Self::Enable(name.to_string()),
            ("disable", Some(name)) => Self::Disable(name.to_string()),
            ("mode", Some(mode)) => match mode.to_ascii_lowercase().parse::<EnablementMode>() {
                Ok(mode) => Self::Mode(mode),
                Err(_) => Self::Invalid(format!("Unknown mode '{mode}'; use all or selective.")),
            },
            _ => return None,
        };
        Some(command)
    }

    fn apply(&self, registry: &ToolRegistry) -> String {
        match self {
            Self::Enable(name) | Self::Disable(name) => {
                let disable = matches!(self, Self::Disable(_));
                if !registry.set_disabled(name, disable) {
                    return format!("No connected server provides a tool named '{name}'.");
                }
                let state = if disable { "disabled" } else { "enabled" };
                format!("Tool '{name}' {state}.")
            }
            Self::EnableAll => {
                registry.enable_all();
                "All tools enabled.".to_string()
            }
            Self::DisableAll => {
                registry.disable_all();
                "All tools disabled.".to_string()
            }
            Self::Mode(mode) => {
                registry.set_mode(*mode);
                format!("Mode set to {mode}.")
            }
            Self::Invalid(message) => message.clone(),
        }
    }
}

fn print_tool_history(session: &Session) {
    let records = session.tool_history().recent(HISTORY_PREVIEW);
    if records.is_empty() {
        println!("No tool calls yet.");
        return;
    }
    for record in records {
        let status = match (&record.error, record.duration_ms) {
            (_, None) => "running".to_string(),
            (Some(error), Some(ms)) => format!("failed in {ms}ms: {}", preview(error)),
            (None, Some(ms)) => format!("ok in {ms}ms"),
        };
        println!(
            "{} {} [{}] {}",
            record.created_at.format("%H:%M:%S"),
            record.tool_name,
            record.provider_id,
            status
        );
    }
}

async fn print_messages(session: &Session) {
    let messages = session.messages().await;
    if messages.is_empty() {
        println!("Conversation is empty.");
        return;
    }
    for message in messages {
        match message.role {
            Role::Assistant if message.has_tool_calls() => {
                let names: Vec<_> = message.tool_calls.iter().map(|c| c.name.as_str()).collect();
                println!("assistant: {} [calls: {}]", preview(message.text()), names.join(", "));
            }
            role => println!("{role}: {}", preview(message.text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::ToolCatalogEntry;

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        let schema = serde_json::json!({"type": "object"});
        registry.register_provider_catalog(
            "fs",
            vec![
                ToolCatalogEntry::new("fs", "read_file", "Read", schema.clone()),
                ToolCatalogEntry::new("fs", "list_dir", "List", schema),
            ],
        );
        registry
    }

    fn run(registry: &ToolRegistry, line: &str) -> String {
        ToolCommand::parse(line).expect("tool command").apply(registry)
    }

    #[test]
    fn tool_commands_parse() {
        assert_eq!(ToolCommand::parse("enable all"), Some(ToolCommand::EnableAll));
        assert_eq!(ToolCommand::parse("Disable ALL"), Some(ToolCommand::DisableAll));
        assert_eq!(
            ToolCommand::parse("disable read_file"),
            Some(ToolCommand::Disable("read_file".into()))
        );
        assert_eq!(
            ToolCommand::parse("mode selective"),
            Some(ToolCommand::Mode(EnablementMode::Selective))
        );
        assert!(matches!(ToolCommand::parse("mode sometimes"), Some(ToolCommand::Invalid(_))));
        assert_eq!(ToolCommand::parse("enable the read tool please"), None);
        assert_eq!(ToolCommand::parse("what is in /tmp?"), None);
    }

    #[test]
    fn tool_commands_drive_the_registry() {
        let registry = registry();

        assert_eq!(run(&registry, "disable read_file"), "Tool 'read_file' disabled.");
        assert!(!registry.is_enabled("read_file"));
        assert_eq!(registry.merged_tool_specs().len(), 1);

        assert_eq!(run(&registry, "enable read_file"), "Tool 'read_file' enabled.");
        assert!(registry.is_enabled("read_file"));

        run(&registry, "disable all");
        assert!(registry.merged_tool_specs().is_empty());
        run(&registry, "enable all");
        assert_eq!(registry.merged_tool_specs().len(), 2);

        run(&registry, "mode selective");
        assert_eq!(registry.mode(), EnablementMode::Selective);
    }

    #[test]
    fn unknown_tool_is_reported() {
        let registry = registry();
        assert_eq!(
            run(&registry, "disable git_log"),
            "No connected server provides a tool named 'git_log'."
        );
    }

    #[test]
    fn preview_keeps_short_text() {
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        let text = "é".repeat(150);
        let cut = preview(&text);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= PREVIEW_CHARS + 3);
    }
}
