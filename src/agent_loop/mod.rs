//! Orchestration loop primitives (turns, events, listener sink).

pub mod events;
pub mod runner;
pub mod sink;
pub mod types;

pub use events::*;
pub use runner::*;
pub use sink::*;
pub use types::*;
