//! Model-backed reasoner
//!
//! Adapts any [`LLMProvider`] to the engine's [`Reasoner`] boundary.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::{Config, Result, SwitchboardError, Topology};
use crate::llm::ollama::OllamaClient;
use crate::llm::traits::{GenerateOptions, LLMProvider, ModelReply, Reasoner, ReasoningRequest};

/// Reasoner that asks a chat model for each decision
pub struct ModelReasoner {
    provider: Arc<dyn LLMProvider>,
    default_model: String,
    temperature: f32,
}

impl ModelReasoner {
    pub fn new(provider: Arc<dyn LLMProvider>, default_model: impl Into<String>) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
            temperature: 0.1,
        }
    }

    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &Config) -> Self {
        Self::new(provider, config.model.name.clone()).with_temperature(config.model.temperature)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Models among the default and `overrides` that the provider does not serve
    pub async fn missing_models(&self, overrides: &[String]) -> Result<Vec<String>> {
        self.provider.list_models().await.map_err(|e| {
            SwitchboardError::model(format!(
                "Cannot reach {}: {}",
                self.provider.name(),
                e
            ))
        })?;

        let mut missing: Vec<String> = Vec::new();
        for model in std::iter::once(&self.default_model).chain(overrides) {
            if missing.contains(model) {
                continue;
            }
            if !self.provider.is_model_available(model).await? {
                missing.push(model.clone());
            }
        }
        Ok(missing)
    }
}

/// Startup check that the configured provider can serve every model the topology uses
pub async fn check_models(config: &Config, topology: &Topology) -> Result<()> {
    let provider = Arc::new(OllamaClient::from_config(config)?);
    let reasoner = ModelReasoner::from_config(provider, config);
    let missing = reasoner.missing_models(&topology.models()).await?;
    if missing.is_empty() {
        return Ok(());
    }
    Err(SwitchboardError::model(format!(
        "Model(s) not available: {}. Pull with: ollama pull {}",
        missing.join(", "),
        missing[0]
    )))
}

#[async_trait]
impl Reasoner for ModelReasoner {
    async fn reason(&self, request: &ReasoningRequest) -> Result<ModelReply> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        debug!(
            agent = %request.agent,
            model,
            provider = self.provider.name(),
            "Reasoning"
        );

        let response = self
            .provider
            .chat_with_tools(
                model,
                &request.messages,
                &request.tools,
                Some(GenerateOptions {
                    temperature: Some(self.temperature),
                    ..Default::default()
                }),
            )
            .await?;

        Ok(ModelReply::from(response))
    }
}
