//! Core module - shared infrastructure for Switchboard
//!
//! This module contains foundational types, configuration, topology loading,
//! and error handling used throughout the crate.

pub mod config;
pub mod error;
pub mod topology;
pub mod types;

pub use config::{Config, EngineConfig, LoggingConfig, ModelConfig, RetryConfig, SessionConfig};
pub use error::{Result, SwitchboardError, TaskError, TaskErrorKind, ToolErrorKind, ToolFailure};
pub use topology::{Topology, TopologyFile};
pub use types::*;
