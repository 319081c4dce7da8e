//! Built-in local tools
//!
//! Small in-process tools available to every topology under the
//! `builtin` toolset and as `local` handlers for custom toolsets.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::ToolFailure;
use crate::tools::invoker::{LocalTool, ToolInvoker};
use crate::tools::registry::{ToolDescriptor, Toolset};

/// Name of the toolset holding every built-in tool
pub const BUILTIN_TOOLSET: &str = "builtin";

fn text_arg(args: &Value, key: &str) -> Result<String, ToolFailure> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolFailure::invalid_args(format!("'{}' must be a string", key)))
}

/// Connectivity check, always answers "pong"
pub struct PingTool;

#[async_trait]
impl LocalTool for PingTool {
    async fn call(&self, _args: Value) -> Result<Value, ToolFailure> {
        Ok(json!("pong"))
    }
}

/// Returns its `text` argument unchanged
pub struct EchoTool;

#[async_trait]
impl LocalTool for EchoTool {
    async fn call(&self, args: Value) -> Result<Value, ToolFailure> {
        Ok(json!(text_arg(&args, "text")?))
    }
}

/// Word, character and line counts for a piece of text
pub struct WordStatsTool;

#[async_trait]
impl LocalTool for WordStatsTool {
    async fn call(&self, args: Value) -> Result<Value, ToolFailure> {
        let text = text_arg(&args, "text")?;
        Ok(json!({
            "words": text.split_whitespace().count(),
            "chars": text.chars().count(),
            "lines": text.lines().count(),
        }))
    }
}

/// Current UTC time in RFC 3339
pub struct ClockTool;

#[async_trait]
impl LocalTool for ClockTool {
    async fn call(&self, _args: Value) -> Result<Value, ToolFailure> {
        Ok(json!(chrono::Utc::now().to_rfc3339()))
    }
}

fn text_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "text": { "type": "string", "description": description }
        },
        "required": ["text"],
        "additionalProperties": false
    })
}

/// Descriptors for the built-in tools
pub fn builtin_toolset() -> Toolset {
    Toolset::new(
        BUILTIN_TOOLSET,
        vec![
            ToolDescriptor::local("ping", "Check that tools are reachable. Returns \"pong\"."),
            ToolDescriptor::local("echo", "Return the given text unchanged")
                .with_schema(text_schema("Text to echo back")),
            ToolDescriptor::local("word_stats", "Count words, characters and lines in text")
                .with_schema(text_schema("Text to measure")),
            ToolDescriptor::local("clock", "Current UTC date and time"),
        ],
    )
}

/// Register the built-in handlers with an invoker
pub fn register_builtins(invoker: &mut ToolInvoker) {
    invoker.register_local("ping", Arc::new(PingTool));
    invoker.register_local("echo", Arc::new(EchoTool));
    invoker.register_local("word_stats", Arc::new(WordStatsTool));
    invoker.register_local("clock", Arc::new(ClockTool));
}
