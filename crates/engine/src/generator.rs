//! Workflow Generator
//!
//! Asks an LLM to plan a natural-language request as a workflow over the
//! registered tools. The plan is checked for shape only; tool names are not
//! checked until the engine runs it.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::{parse_json_from_llm_response, LLMProvider};
use crate::tools::ToolSchema;
use crate::workflow::model::new_workflow_id;
use crate::workflow::{Workflow, WorkflowStep};
use crate::{Error, Result};

const PLANNER_PREAMBLE: &str = "You are a workflow planner. Your task is to break down a user's \
complex request into a structured, step-by-step workflow using the available tools.";

/// Planner output before defaults are filled in.
#[derive(Debug, Deserialize)]
struct WorkflowDraft {
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default)]
    original_request: Option<String>,
    steps: Vec<WorkflowStep>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

pub struct WorkflowGenerator {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl WorkflowGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        let model = model.into();
        info!("Initialized WorkflowGenerator with model: {}", model);
        Self { provider, model }
    }

    pub async fn generate(&self, request: &str, tools: &[ToolSchema]) -> Result<Workflow> {
        info!("Generating workflow for request: {}", request);

        let prompt = self.build_prompt(request, tools);
        let reply = self
            .provider
            .prompt(&self.model, &prompt)
            .await
            .map_err(|e| Error::Generation(format!("LLM call failed: {:#}", e)))?;
        debug!("Planner reply: {}", reply);

        let value = parse_json_from_llm_response(&reply)
            .ok_or_else(|| Error::Generation("planner reply contained no JSON object".to_string()))?;
        let draft: WorkflowDraft = serde_json::from_value(value)
            .map_err(|e| Error::Generation(format!("planner reply is not a workflow: {}", e)))?;

        let workflow = Workflow::from_parts(
            draft.workflow_id.unwrap_or_else(new_workflow_id),
            draft
                .original_request
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| request.to_string()),
            draft.steps,
            draft.created_at.unwrap_or_else(Utc::now),
        );
        workflow.validate()?;

        info!(
            "Generated workflow with {} steps (ID: {})",
            workflow.steps().len(),
            workflow.workflow_id()
        );
        Ok(workflow)
    }

    pub fn build_prompt(&self, request: &str, tools: &[ToolSchema]) -> String {
        format!(
            r#"{PLANNER_PREAMBLE}

**User Request:**
{request}

**Available Tools:**
{tools}

**Instructions:**
1. Analyze the user's request and determine what steps are needed.
2. For each step, select the most appropriate tool from the available tools.
3. Define the parameters for each tool call. Use the syntax "$context.variable_name" to reference outputs from previous steps, with ".field" and "[index]" to reach inside them.
4. Assign each step's output to a meaningful variable name using "output_variable".
5. Return a JSON object with the following structure:

{{
  "original_request": "...",
  "steps": [
    {{
      "step_id": 1,
      "description": "Description of what this step does",
      "tool_name": "tool_name",
      "parameters": {{
        "param1": "value1",
        "param2": "$context.previous_output"
      }},
      "output_variable": "variable_name"
    }}
  ]
}}

**Important:**
- step_id starts from 1 and increments sequentially.
- Only use tools listed in the Available Tools section.
- A reference must be the entire parameter value, never part of a longer string.
- Return ONLY valid JSON, no additional text or explanation.

Generate the workflow now:"#,
            tools = format_tools(tools)
        )
    }
}

/// Renders schemas as a plain-text tool list for the planner.
pub fn format_tools(tools: &[ToolSchema]) -> String {
    let mut out = String::new();
    for tool in tools {
        out.push_str(&format!("Tool: {}\n", tool.name));
        out.push_str(&format!("Description: {}\n", tool.description));
        out.push_str("Parameters:\n");
        if tool.parameters.properties.is_empty() {
            out.push_str("  (none)\n");
        }
        for (name, param) in &tool.parameters.properties {
            let marker = if tool.is_required(name) {
                "required"
            } else {
                "optional"
            };
            let mut line = format!("  - {}: {} ({})", name, param.param_type.as_str(), marker);
            if let Some(default) = &param.default {
                line.push_str(&format!(" [default: {}]", default));
            }
            if let Some(allowed) = &param.allowed {
                let rendered: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                line.push_str(&format!(" [one of: {}]", rendered.join(", ")));
            }
            out.push_str(&line);
            out.push('\n');
            if let Some(description) = &param.description {
                out.push_str(&format!("    {}\n", description));
            }
        }
        out.push_str(&format!("Returns: {}\n\n", tool.returns.return_type));
    }
    out
}
