//! LLM module - model integrations
//!
//! Provides the provider abstraction with Ollama as the backend, and the
//! reasoner boundary the engine calls for every decision.

pub mod ollama;
pub mod reasoner;
pub mod traits;

pub use ollama::OllamaClient;
pub use reasoner::{check_models, ModelReasoner};
pub use traits::{
    GenerateOptions, LLMProvider, LLMResponse, ModelReply, Reasoner, ReasoningRequest, TokenUsage,
};
