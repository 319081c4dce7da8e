//! Model abstractions
//!
//! `LLMProvider` is the chat-completion backend (Ollama today); `Reasoner` is
//! the narrow boundary the orchestration engine depends on, so tests can
//! script decisions without a model.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{Message, Result, ToolCall, ToolDefinition};

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// Text content of the response
    pub content: String,
    /// Any tool calls the model wants to make
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information
    pub usage: Option<TokenUsage>,
    /// Model that generated the response
    pub model: String,
}

/// Token usage information
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Options for LLM generation
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Temperature for sampling (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a response with tool definitions (empty slice = plain chat)
    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Check if a model is available
    async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m == model || m.starts_with(&format!("{}:", model))))
    }

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Everything a reasoning call sees
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    /// Agent being stepped
    pub agent: String,
    /// Model to use, if the agent names one
    pub model: Option<String>,
    /// Prompt: system instruction, recent history, then the input
    pub messages: Vec<Message>,
    /// Tools the agent may call, including routing pseudo-tools
    pub tools: Vec<ToolDefinition>,
}

impl ReasoningRequest {
    /// The input this step is answering (the last user message)
    pub fn input(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn offers_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.function.name == name)
    }
}

/// Raw output of one reasoning call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Variable writes the agent wants recorded
    pub state_delta: Vec<(String, Value)>,
}

impl ModelReply {
    /// A plain answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A single tool call
    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_calls: vec![ToolCall::new(name, arguments)],
            ..Default::default()
        }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state_delta.push((key.into(), value));
        self
    }
}

impl From<LLMResponse> for ModelReply {
    fn from(response: LLMResponse) -> Self {
        Self {
            text: response.content,
            tool_calls: response.tool_calls,
            state_delta: Vec::new(),
        }
    }
}

/// The opaque model capability: `Reason(prompt, context) -> (text, toolCalls)`
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ModelReply>;
}
