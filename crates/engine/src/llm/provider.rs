//! LLM Provider Abstraction
//!
//! Provides a unified interface for different LLM providers using Rig.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use rig::completion::Prompt;
use rig::providers::{anthropic, openai};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub base_url: Option<String>,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: None,
            model: "gpt-4".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Trait for LLM providers that can handle prompts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a single-turn prompt to `model` and return the reply text
    async fn prompt(&self, model: &str, prompt: &str) -> Result<String>;
}

fn key_or_env(api_key: Option<&str>, var: &str) -> Result<String> {
    match api_key.filter(|k| !k.is_empty()) {
        Some(key) => Ok(key.to_string()),
        None => std::env::var(var)
            .map_err(|_| anyhow!("no API key configured; set LLM_API_KEY or {}", var)),
    }
}

/// OpenAI-compatible provider (OpenAI itself, OpenRouter, local gateways)
pub struct OpenAIProvider {
    client: openai::Client,
    temperature: f64,
    max_tokens: u64,
}

impl OpenAIProvider {
    pub fn new(config: &LLMConfig, default_base_url: Option<&str>) -> Result<Self> {
        let key = key_or_env(config.api_key.as_deref(), "OPENAI_API_KEY")?;
        let client = match config.base_url.as_deref().or(default_base_url) {
            Some(url) => openai::Client::from_url(&key, url),
            None => openai::Client::new(&key),
        };

        Ok(Self {
            client,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait::async_trait]
impl LLMProvider for OpenAIProvider {
    async fn prompt(&self, model: &str, prompt: &str) -> Result<String> {
        let agent = self
            .client
            .agent(model)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build();

        let response = agent
            .prompt(prompt)
            .await
            .map_err(|e| anyhow!("OpenAI API error: {:?}", e))?;

        Ok(response)
    }
}

/// Anthropic Claude provider using Rig
pub struct AnthropicProvider {
    client: anthropic::Client,
    temperature: f64,
    max_tokens: u64,
}

impl AnthropicProvider {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let key = key_or_env(config.api_key.as_deref(), "ANTHROPIC_API_KEY")?;
        let client = anthropic::Client::new(
            &key,
            config.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL),
            None,
            anthropic::ANTHROPIC_VERSION_LATEST,
        );

        Ok(Self {
            client,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait::async_trait]
impl LLMProvider for AnthropicProvider {
    async fn prompt(&self, model: &str, prompt: &str) -> Result<String> {
        let agent = self
            .client
            .agent(model)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build();

        let response = agent
            .prompt(prompt)
            .await
            .map_err(|e| anyhow!("Anthropic API error: {:?}", e))?;

        Ok(response)
    }
}

/// Offline provider: replies with a fixed text, or echoes the start of the
/// prompt when none is set.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    response: Option<String>,
}

impl MockProvider {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn prompt(&self, model: &str, prompt: &str) -> Result<String> {
        Ok(match &self.response {
            Some(response) => response.clone(),
            None => format!(
                "[{}] {}",
                model,
                prompt.chars().take(80).collect::<String>()
            ),
        })
    }
}

/// Create a provider from configuration
pub fn create_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
    debug!("Creating LLM provider '{}'", config.provider);
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIProvider::new(config, None)?)),
        "openrouter" => Ok(Arc::new(OpenAIProvider::new(
            config,
            Some(OPENROUTER_BASE_URL),
        )?)),
        "anthropic" | "claude" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        "mock" => Ok(Arc::new(MockProvider::default())),
        other => Err(anyhow!(
            "unknown LLM provider '{}' (expected openai, openrouter, anthropic or mock)",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider() {
        let echo = MockProvider::default();
        let reply = echo.prompt("gpt-4", "Summarize this").await.unwrap();
        assert_eq!(reply, "[gpt-4] Summarize this");

        let fixed = MockProvider::with_response("{}");
        assert_eq!(fixed.prompt("any", "x").await.unwrap(), "{}");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = LLMConfig {
            provider: "cohere".to_string(),
            ..LLMConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("unknown LLM provider 'cohere'"));
    }

    #[test]
    fn test_explicit_key_builds_without_env() {
        let config = LLMConfig {
            provider: "openrouter".to_string(),
            api_key: Some("sk-test".to_string()),
            ..LLMConfig::default()
        };
        assert!(create_provider(&config).is_ok());
    }
}
