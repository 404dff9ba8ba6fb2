//! CLI surface for toolloop.

pub mod chat;
pub mod conversations;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Tool-calling chat over MCP servers
#[derive(Parser, Debug)]
#[command(name = "toolloop", version, about = "Chat with a model that can call MCP tools")]
pub struct Cli {
    /// Config file (TOML); defaults to ~/.toolloop/config.toml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat session
    Chat(ChatArgs),
    /// Ask a single question and print the answer
    Ask(AskArgs),
    /// Write an MCP server config file
    Init(InitArgs),
    /// Inspect stored conversations
    Conversations(ConversationsArgs),
}

/// Arguments for `toolloop chat`.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Wait for whole responses instead of streaming
    #[arg(long)]
    pub no_stream: bool,
}

/// Arguments for `toolloop ask`.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question
    pub prompt: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,
}

/// Arguments for `toolloop init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Server command
    #[arg(long, default_value = "python")]
    pub command: String,

    /// Server argument (repeatable)
    #[arg(long = "arg")]
    pub args: Vec<String>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `conversations` subcommand group.
#[derive(Args, Debug)]
pub struct ConversationsArgs {
    #[command(subcommand)]
    pub command: ConversationCommands,
}

/// Conversation store subcommands.
#[derive(Subcommand, Debug)]
pub enum ConversationCommands {
    /// List recent conversations
    List {
        #[arg(long, default_value_t = crate::store::DEFAULT_RECENT_LIMIT)]
        limit: usize,
        /// List every conversation
        #[arg(long)]
        all: bool,
    },
    /// Print a conversation
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
