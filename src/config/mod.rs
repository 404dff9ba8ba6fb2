//! Configuration (layered: defaults < TOML file < environment).

pub mod mcp;
pub mod prompt;

pub use mcp::{McpServerConfig, McpServersConfig};
pub use prompt::{default_system_prompt, render_system_prompt, UserInfo};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent_loop::LoopSettings;
use crate::conversation::DEFAULT_HISTORY_CAP;
use crate::error::{Result, ToolLoopError};
use crate::tools::history::DEFAULT_TOOL_HISTORY_LIMIT;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TOOL_CALL_TIMEOUT_SECS: u64 = 30;

const CONFIG_FILE_NAME: &str = "config.toml";
const MCP_CONFIG_FILE_NAME: &str = "mcp.json";
const DATABASE_FILE_NAME: &str = "conversations.db";

/// Model service settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("model", &self.model)
            .finish()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Typed configuration for a toolloop session.
///
/// Passed explicitly to whatever builds the session; there is no global
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolLoopConfig {
    pub tool_call_timeout_secs: u64,
    pub history_cap: usize,
    pub tool_history_limit: usize,
    pub stream: bool,
    pub verbose: bool,
    /// Overrides the built-in assistant prompt when set.
    pub system_prompt: Option<String>,
    pub mcp_config_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub model: ModelConfig,
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self {
            tool_call_timeout_secs: DEFAULT_TOOL_CALL_TIMEOUT_SECS,
            history_cap: DEFAULT_HISTORY_CAP,
            tool_history_limit: DEFAULT_TOOL_HISTORY_LIMIT,
            stream: true,
            verbose: false,
            system_prompt: None,
            mcp_config_path: None,
            database_path: None,
            model: ModelConfig::default(),
        }
    }
}

impl ToolLoopConfig {
    /// Defaults overridden by environment variables (a `.env` file is
    /// honoured).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults, then the TOML file at `path` (or the default config file if
    /// it exists), then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(default_config_dir().join(CONFIG_FILE_NAME)).filter(|p| p.exists()),
        };
        let mut config = match file {
            Some(path) => Self::from_toml_file(&path)?,
            None => Self::default(),
        };
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ToolLoopError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ToolLoopError::Configuration(format!("invalid config file: {e}")))
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|v| !v.is_empty()) {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|v| !v.is_empty()) {
            self.model.model = model;
        }
        if let Some(raw) = lookup("TOOL_CALL_TIMEOUT") {
            self.tool_call_timeout_secs = parse_number("TOOL_CALL_TIMEOUT", &raw)?;
        }
        if let Some(raw) = lookup("TOOLLOOP_HISTORY_CAP") {
            self.history_cap = parse_number("TOOLLOOP_HISTORY_CAP", &raw)?;
        }
        if let Some(raw) = lookup("TOOLLOOP_TOOL_HISTORY_LIMIT") {
            self.tool_history_limit = parse_number("TOOLLOOP_TOOL_HISTORY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("TOOLLOOP_STREAM") {
            self.stream = parse_bool("TOOLLOOP_STREAM", &raw)?;
        }
        if let Some(raw) = lookup("VERBOSE_LOGGING") {
            self.verbose = parse_bool("VERBOSE_LOGGING", &raw)?;
        }
        if let Some(prompt) = lookup("TOOLLOOP_SYSTEM_PROMPT").filter(|v| !v.is_empty()) {
            self.system_prompt = Some(prompt);
        }
        if let Some(path) = lookup("TOOLLOOP_MCP_CONFIG").filter(|v| !v.is_empty()) {
            self.mcp_config_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("TOOLLOOP_DB_PATH").filter(|v| !v.is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_secs)
    }

    pub fn mcp_config_path(&self) -> PathBuf {
        self.mcp_config_path
            .clone()
            .unwrap_or_else(|| default_config_dir().join(MCP_CONFIG_FILE_NAME))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_config_dir().join(DATABASE_FILE_NAME))
    }

    /// The configured prompt, or the default assistant prompt for this
    /// machine.
    pub fn system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(default_system_prompt)
    }

    /// Orchestration loop settings derived from this config.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings::builder()
            .tool_timeout(self.tool_call_timeout())
            .stream(self.stream)
            .history_cap(self.history_cap)
            .system_prompt(self.system_prompt())
            .build()
    }
}

/// `~/.toolloop`, or `.toolloop` when no home directory is known.
pub fn default_config_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".toolloop"))
        .unwrap_or_else(|| PathBuf::from(".toolloop"))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ToolLoopError::Configuration(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ToolLoopError::Configuration(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}
