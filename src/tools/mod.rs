//! Tool routing, dispatch and history.

pub mod arguments;
pub mod dispatcher;
pub mod history;
pub mod provider;
pub mod registry;
pub mod response;

pub use arguments::parse_tool_arguments;
pub use dispatcher::{Dispatch, DispatchOutcome, ToolDispatcher, DEFAULT_TOOL_CALL_TIMEOUT};
pub use history::{CallCompletion, ToolCallRecord, ToolHistory};
pub use provider::ToolProvider;
pub use registry::{EnablementMode, ToolCollision, ToolRegistry};
pub use response::ToolResponse;
