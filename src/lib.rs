//! toolloop — tool-call orchestration engine
//!
//! Sends a conversation to a chat-completion model, reassembles streamed
//! output (including tool calls split across many increments), routes tool
//! calls to MCP servers under a per-call deadline, and loops until the model
//! answers without asking for more tools. Every step is reported as a
//! [`agent_loop::TurnEvent`] to a single swappable listener.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolloop::prelude::*;
//! use toolloop::model::openai::OpenAiChatService;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> toolloop::error::Result<()> {
//! let config = ToolLoopConfig::from_env()?;
//! let model = Arc::new(OpenAiChatService::from_config(&config.model)?);
//! let session = Session::from_config(&config, model, None);
//! let answer = session
//!     .process_query("What's in /tmp?", None, &CancellationToken::new())
//!     .await;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod aggregator;
pub mod config;
pub mod conversation;
pub mod error;
pub mod model;
pub mod prelude;
pub mod session;
pub mod store;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "mcp")]
pub mod mcp;

#[cfg(feature = "cli")]
pub mod cli;
