//! Switchboard - Hierarchical Multi-Agent Orchestration
//!
//! A runtime that routes a natural-language task through a tree of agents:
//! coordinators delegate to specialists, workflows run children in sequence
//! or in parallel, and every agent calls tools through one uniform protocol
//! whether the tool is an in-process handler, an HTTP service or a generated
//! client.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, topology loading, and errors
//! - **Tools**: Toolset registry, schema-checked invoker, built-in tools
//! - **Session**: Per-session history and variables, branch isolation
//! - **LLM**: Model provider abstraction with Ollama implementation
//! - **Agent**: Agent specs, single reasoning steps, retry, merging
//! - **Engine**: Task execution, delegation, fan-out, events
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use switchboard::{Config, Engine, SessionId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Engine::from_config(&Config::load()).unwrap();
//!     let session = SessionId::new();
//!
//!     let outcome = engine.submit_task(&session, "Test tool connectivity").await.unwrap();
//!     println!("{} (via {})", outcome.answer, outcome.visited.join(" > "));
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod engine;
pub mod llm;
pub mod session;
pub mod tools;

// Re-export commonly used items
pub use agent::{AgentCard, AgentSpec};
pub use cli::Repl;
pub use core::{Config, Result, SessionId, SwitchboardError, TaskError, Topology};
pub use engine::{Engine, EngineEvent, TaskOutcome};
