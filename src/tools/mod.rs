//! Tools module - toolset catalog and tool invocation
//!
//! Contains the tool registry, the transport-agnostic invoker, argument
//! validation, and the built-in local tools.

pub mod builtin;
pub mod invoker;
pub mod registry;
pub mod schema;

pub use builtin::{builtin_toolset, register_builtins, BUILTIN_TOOLSET};
pub use invoker::{LocalTool, ToolClient, ToolInvoker, ToolRequest, ToolResponse, WireError};
pub use registry::{EndpointRef, ToolDescriptor, ToolRegistry, Toolset};
