//! LLM-Driven Tools
//!
//! A model plus one fixed text operation. Results are best-effort: only
//! `extract` attempts structure, and falls back to the raw reply.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::schema::{ParamType, ToolParameter, ToolSchema};
use crate::llm::{parse_json_from_llm_response, LLMProvider};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmOperation {
    Analyze,
    Summarize,
    Extract,
    Transform,
    Answer,
    Generate,
}

impl LlmOperation {
    pub const ALL: [LlmOperation; 6] = [
        LlmOperation::Analyze,
        LlmOperation::Summarize,
        LlmOperation::Extract,
        LlmOperation::Transform,
        LlmOperation::Answer,
        LlmOperation::Generate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmOperation::Analyze => "analyze",
            LlmOperation::Summarize => "summarize",
            LlmOperation::Extract => "extract",
            LlmOperation::Transform => "transform",
            LlmOperation::Answer => "answer",
            LlmOperation::Generate => "generate",
        }
    }

    /// Schema a catalog gets when it declares the operation without listing
    /// parameters.
    pub fn default_schema(&self, name: &str, description: &str) -> ToolSchema {
        let text = |what: &str| ToolParameter::new(ParamType::String).describe(what);
        let schema = ToolSchema::new(name, description);
        match self {
            LlmOperation::Analyze => schema
                .required("text", text("Text to analyze"))
                .required("task", text("What to look for"))
                .returns("string"),
            LlmOperation::Summarize => schema
                .required("text", text("Text to summarize"))
                .returns("string"),
            LlmOperation::Extract => schema
                .required("text", text("Source text"))
                .required(
                    "fields",
                    ToolParameter::new(ParamType::Array).describe("Field names to extract"),
                )
                .returns("object"),
            LlmOperation::Transform => schema
                .required("text", text("Source text"))
                .required("transformation", text("How to transform it"))
                .returns("string"),
            LlmOperation::Answer => schema
                .required("context", text("Background information"))
                .required("question", text("Question to answer"))
                .returns("string"),
            LlmOperation::Generate => schema
                .required("task", text("What to generate"))
                .optional("context", text("Optional background"))
                .returns("string"),
        }
    }
}

impl fmt::Display for LlmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LlmOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown LLM operation '{}' (expected one of analyze, summarize, extract, transform, answer, generate)",
                    s
                ))
            })
    }
}

#[derive(Clone)]
pub struct LlmTool {
    model: String,
    operation: LlmOperation,
    provider: Arc<dyn LLMProvider>,
}

impl LlmTool {
    pub fn new(model: impl Into<String>, operation: LlmOperation, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            model: model.into(),
            operation,
            provider,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn operation(&self) -> LlmOperation {
        self.operation
    }

    /// Formats the operation's prompt from the resolved arguments.
    pub fn build_prompt(&self, tool: &str, arguments: &Map<String, Value>) -> Result<String> {
        let arg = |name: &str| {
            arguments
                .get(name)
                .filter(|v| !v.is_null())
                .map(as_text)
                .ok_or_else(|| Error::validation(tool, format!("missing argument '{}'", name)))
        };

        let prompt = match self.operation {
            LlmOperation::Analyze => format!(
                "Task: {}\n\nText to analyze:\n{}\n\nPlease provide your analysis:",
                arg("task")?,
                arg("text")?
            ),
            LlmOperation::Summarize => format!(
                "Summarize the following text concisely.\n\nText:\n{}\n\nSummary:",
                arg("text")?
            ),
            LlmOperation::Extract => {
                let fields = match arguments.get("fields") {
                    Some(Value::Array(items)) => {
                        items.iter().map(as_text).collect::<Vec<_>>().join(", ")
                    }
                    Some(other) if !other.is_null() => as_text(other),
                    _ => return Err(Error::validation(tool, "missing argument 'fields'")),
                };
                format!(
                    "Extract the following information from the text: {fields}\n\nText:\n{}\n\nReturn the information in JSON format with keys: {fields}",
                    arg("text")?
                )
            }
            LlmOperation::Transform => format!(
                "Transform the following text: {}\n\nOriginal text:\n{}\n\nTransformed text:",
                arg("transformation")?,
                arg("text")?
            ),
            LlmOperation::Answer => format!(
                "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
                arg("context")?,
                arg("question")?
            ),
            LlmOperation::Generate => match arg("context") {
                Ok(context) => format!(
                    "Task: {}\n\nContext:\n{}\n\nGenerated content:",
                    arg("task")?,
                    context
                ),
                Err(_) => format!("Task: {}\n\nGenerated content:", arg("task")?),
            },
        };

        Ok(prompt)
    }

    pub async fn call(&self, tool: &str, arguments: &Map<String, Value>) -> Result<Value> {
        let prompt = self.build_prompt(tool, arguments)?;
        debug!("Prompting {} for {} ({} chars)", self.model, self.operation, prompt.len());

        let reply = self
            .provider
            .prompt(&self.model, &prompt)
            .await
            .map_err(|e| Error::execution(tool, format!("{:#}", e)))?;

        Ok(match self.operation {
            LlmOperation::Extract => parse_json_from_llm_response(&reply)
                .unwrap_or_else(|| json!({ "raw_response": reply })),
            _ => Value::String(reply),
        })
    }
}

impl fmt::Debug for LlmTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmTool")
            .field("model", &self.model)
            .field("operation", &self.operation)
            .finish()
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
