//! Convenience re-exports for common use.

pub use crate::agent_loop::{LoopSettings, TurnEvent, TurnEventPayload, TurnOutcome, TurnStatus};
pub use crate::config::ToolLoopConfig;
pub use crate::error::{Result, ToolLoopError};
pub use crate::model::{ModelRequest, ModelService};
pub use crate::session::{Session, TurnHandle};
pub use crate::store::ConversationStore;
pub use crate::tools::{ToolProvider, ToolResponse};
pub use crate::types::{ChatMessage, Role, ToolCatalogEntry};
