//! LLM integration for Phish Agent.
//!
//! The reasoning service is anything implementing [`LlmProvider`]. The
//! shipped backend is [`OpenAiProvider`], which speaks the OpenAI
//! function-calling protocol over `reqwest`.

pub mod openai;
pub mod provider;
pub mod reasoning;

pub use openai::OpenAiProvider;
pub use provider::*;
pub use reasoning::{Reasoning, Reply, Step, TokenUsage};

use std::sync::Arc;

use crate::config::env_opt;
use crate::error::{ConfigError, LlmError};

/// Default model, matching the one the prompts were tuned against.
pub const DEFAULT_MODEL: &str = "gpt-4.1-2025-04-14";

/// Default API root for the OpenAI backend.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Build from `OPENAI_API_KEY`, `PHISH_AGENT_MODEL` and `PHISH_AGENT_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key: String = env_opt("OPENAI_API_KEY")?
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;
        let model = env_opt("PHISH_AGENT_MODEL")?.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url =
            env_opt("PHISH_AGENT_BASE_URL")?.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            model,
            base_url,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(&config.base_url, config.api_key.clone(), &config.model)?;
    tracing::info!(
        "Using OpenAI-compatible backend at {} (model: {})",
        config.base_url,
        config.model
    );
    Ok(Arc::new(provider))
}
