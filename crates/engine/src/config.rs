use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::llm::LLMConfig;
use crate::workflow::RetryPolicy;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RetryBackoff {
    #[serde(rename = "fixed")]
    #[default]
    Fixed,
    #[serde(rename = "exponential")]
    Exponential,
}

impl FromStr for RetryBackoff {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(RetryBackoff::Fixed),
            "exponential" => Ok(RetryBackoff::Exponential),
            other => Err(format!("expected 'fixed' or 'exponential', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LLMConfig,
    pub workflow: WorkflowConfig,
    pub tools: ToolsConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub retry_enabled: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub retry_backoff: RetryBackoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub validate_parameters: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub datastore_path: PathBuf,
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", name, raw, e))),
        _ => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!(
                "{} must be a boolean (true/false), got '{}'",
                name, v
            ))),
        },
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let string_var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Config {
            llm: LLMConfig {
                provider: string_var("LLM_PROVIDER")
                    .map(|p| p.to_lowercase())
                    .unwrap_or(defaults.llm.provider),
                base_url: string_var("LLM_BASE_URL"),
                model: string_var("LLM_MODEL").unwrap_or(defaults.llm.model),
                api_key: string_var("LLM_API_KEY"),
                temperature: parse_var(&lookup, "LLM_TEMPERATURE", defaults.llm.temperature)?,
                max_tokens: parse_var(&lookup, "LLM_MAX_TOKENS", defaults.llm.max_tokens)?,
            },
            workflow: WorkflowConfig {
                retry_enabled: parse_bool(&lookup, "WORKFLOW_RETRY_ENABLED", false)?,
                max_retries: parse_var(&lookup, "WORKFLOW_MAX_RETRIES", defaults.workflow.max_retries)?,
                retry_delay_ms: parse_var(
                    &lookup,
                    "WORKFLOW_RETRY_DELAY_MS",
                    defaults.workflow.retry_delay_ms,
                )?,
                retry_backoff: parse_var(&lookup, "WORKFLOW_RETRY_BACKOFF", RetryBackoff::Fixed)?,
            },
            tools: ToolsConfig {
                validate_parameters: parse_bool(&lookup, "TOOL_VALIDATE_PARAMETERS", true)?,
            },
            feedback: FeedbackConfig {
                datastore_path: string_var("FEEDBACK_DATASTORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.feedback.datastore_path),
            },
        };

        if !(0.0..=2.0).contains(&config.llm.temperature) {
            return Err(Error::Config(format!(
                "LLM_TEMPERATURE must be between 0 and 2, got {}",
                config.llm.temperature
            )));
        }

        if config.llm.api_key.is_none() && config.llm.provider != "mock" {
            tracing::warn!("LLM_API_KEY is not set. Falling back to the provider's own environment variable.");
        }

        Ok(config)
    }

    /// Engine retry policy; `RetryPolicy::None` unless retry is enabled.
    pub fn retry_policy(&self) -> RetryPolicy {
        if !self.workflow.retry_enabled {
            return RetryPolicy::None;
        }
        let delay = Duration::from_millis(self.workflow.retry_delay_ms);
        match self.workflow.retry_backoff {
            RetryBackoff::Fixed => RetryPolicy::fixed(self.workflow.max_retries, delay),
            RetryBackoff::Exponential => RetryPolicy::exponential(self.workflow.max_retries, delay),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LLMConfig::default(),
            workflow: WorkflowConfig {
                retry_enabled: false,
                max_retries: 3,
                retry_delay_ms: 1000,
                retry_backoff: RetryBackoff::Fixed,
            },
            tools: ToolsConfig {
                validate_parameters: true,
            },
            feedback: FeedbackConfig {
                datastore_path: PathBuf::from("data/feedback_labels"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.llm.max_tokens, 4096);
        assert!(config.tools.validate_parameters);
        assert_eq!(config.feedback.datastore_path, PathBuf::from("data/feedback_labels"));
        assert_eq!(config.retry_policy(), RetryPolicy::None);
    }

    #[test]
    fn test_retry_settings() {
        let config = from_pairs(&[
            ("WORKFLOW_RETRY_ENABLED", "true"),
            ("WORKFLOW_MAX_RETRIES", "2"),
            ("WORKFLOW_RETRY_DELAY_MS", "250"),
            ("WORKFLOW_RETRY_BACKOFF", "exponential"),
        ])
        .unwrap();
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::exponential(2, Duration::from_millis(250))
        );

        let fixed = from_pairs(&[("WORKFLOW_RETRY_ENABLED", "1")]).unwrap();
        assert_eq!(fixed.retry_policy(), RetryPolicy::fixed(3, Duration::from_secs(1)));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        for pairs in [
            [("WORKFLOW_MAX_RETRIES", "many")],
            [("TOOL_VALIDATE_PARAMETERS", "maybe")],
            [("LLM_TEMPERATURE", "hot")],
            [("LLM_TEMPERATURE", "3.5")],
            [("WORKFLOW_RETRY_BACKOFF", "linear")],
        ] {
            let err = from_pairs(&pairs).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{:?}", pairs);
        }
    }
}
