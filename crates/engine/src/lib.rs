pub mod config;
pub mod feedback;
pub mod generator;
pub mod llm;
pub mod metrics;
pub mod tools;
pub mod workflow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use workflow::resolve::ResolveError;

/// Failure category recorded on a failed step log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ToolNotFound,
    ParameterResolution,
    ParameterValidation,
    ToolExecution,
    Other,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Tool '{0}' not found in registry")]
    ToolNotFound(String),
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("Parameter resolution failed: {0}")]
    ParameterResolution(#[from] ResolveError),
    #[error("Parameter validation failed for tool '{tool}': {message}")]
    ParameterValidation { tool: String, message: String },
    #[error("Tool '{tool}' execution failed: {message}")]
    ToolExecution { tool: String, message: String },
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Workflow generation error: {0}")]
    Generation(String),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn execution(tool: &str, message: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn validation(tool: &str, message: impl Into<String>) -> Self {
        Error::ParameterValidation {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Only tool execution failures are worth another attempt; everything
    /// else would fail the same way against an unchanged context.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ToolExecution { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Error::ParameterResolution(_) => ErrorKind::ParameterResolution,
            Error::ParameterValidation { .. } => ErrorKind::ParameterValidation,
            Error::ToolExecution { .. } => ErrorKind::ToolExecution,
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
