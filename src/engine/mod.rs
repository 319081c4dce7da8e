//! Engine module - task execution
//!
//! Runs tasks through the agent hierarchy: reasoning loops, delegation,
//! tool calls with retry, and sequential/parallel workflows.

pub mod context;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod events;
mod fanout;

pub use context::TaskContext;
pub use engine::{Engine, EngineSettings, TaskHandle, TaskOutcome};
pub use events::EngineEvent;
