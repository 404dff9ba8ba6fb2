//! `mcpServers` configuration file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolLoopError};

/// How to launch one stdio MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// `{"mcpServers": {"<name>": {...}}}`. Servers keep the order of the file,
/// which is the order they connect and claim tool names in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub servers: IndexMap<String, McpServerConfig>,
}

impl McpServersConfig {
    /// Load from `path`. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "MCP config file not found");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_json(&raw).map_err(|e| {
            ToolLoopError::Configuration(format!("{} contains invalid JSON: {e}", path.display()))
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// A config with a single `default` server.
    pub fn single(command: impl Into<String>, args: Vec<String>) -> Self {
        let mut servers = IndexMap::new();
        servers.insert(
            "default".to_string(),
            McpServerConfig {
                command: command.into(),
                args,
                env: None,
            },
        );
        Self { servers }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
