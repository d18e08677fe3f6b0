//! Workflow Data Model
//!
//! Plans produced by the generator and the audit trail produced by the engine.
//! Both serialize to the JSON shapes consumed by the feedback store.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;

use super::resolve::references;
use crate::{Error, ErrorKind, Result};

/// A single tool invocation within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowStep {
    /// Unique within a workflow; steps run in ascending order.
    pub step_id: u32,

    #[serde(default)]
    pub description: String,

    /// Looked up in the registry when the step runs, never earlier.
    pub tool_name: String,

    /// Literals, `$context.` references, or nested structures of either.
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Context name the tool result is bound to after success.
    #[serde(default)]
    pub output_variable: Option<String>,
}

impl WorkflowStep {
    pub fn new(step_id: u32, tool_name: impl Into<String>) -> Self {
        Self {
            step_id,
            description: String::new(),
            tool_name: tool_name.into(),
            parameters: Map::new(),
            output_variable: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_output(mut self, variable: impl Into<String>) -> Self {
        self.output_variable = Some(variable.into());
        self
    }

    /// The output binding; an empty name, as some planners emit, binds nothing.
    pub fn output_variable(&self) -> Option<&str> {
        self.output_variable
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Root context variables this step reads, in parameter order.
    pub fn references(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut roots = Vec::new();
        for value in self.parameters.values() {
            for reference in references(value) {
                if seen.insert(reference.root().to_string()) {
                    roots.push(reference.root().to_string());
                }
            }
        }
        roots
    }
}

/// An ordered plan derived from a natural-language request.
///
/// Fields are read-only after construction; the engine only ever borrows a
/// workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Workflow {
    #[serde(default = "new_workflow_id")]
    workflow_id: String,
    original_request: String,
    steps: Vec<WorkflowStep>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

pub(crate) fn new_workflow_id() -> String {
    format!("wf-{}", uuid::Uuid::new_v4())
}

impl Workflow {
    pub fn new(original_request: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            workflow_id: new_workflow_id(),
            original_request: original_request.into(),
            steps,
            created_at: Utc::now(),
        }
    }

    pub fn from_parts(
        workflow_id: impl Into<String>,
        original_request: impl Into<String>,
        steps: Vec<WorkflowStep>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            original_request: original_request.into(),
            steps,
            created_at,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn original_request(&self) -> &str {
        &self.original_request
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Structural checks run before any step executes.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::InvalidWorkflow(format!(
                "workflow '{}' has no steps",
                self.workflow_id
            )));
        }

        let mut previous: Option<u32> = None;
        for step in &self.steps {
            if step.step_id == 0 {
                return Err(Error::InvalidWorkflow(
                    "step_id must be a positive integer".to_string(),
                ));
            }
            if step.tool_name.trim().is_empty() {
                return Err(Error::InvalidWorkflow(format!(
                    "step {} has an empty tool_name",
                    step.step_id
                )));
            }
            if let Some(name) = step.output_variable() {
                if name.trim() != name {
                    return Err(Error::InvalidWorkflow(format!(
                        "step {} output_variable '{}' has surrounding whitespace",
                        step.step_id, name
                    )));
                }
            }
            match previous {
                Some(prev) if prev == step.step_id => {
                    return Err(Error::InvalidWorkflow(format!(
                        "duplicate step_id {}",
                        step.step_id
                    )));
                }
                Some(prev) if prev > step.step_id => {
                    return Err(Error::InvalidWorkflow(format!(
                        "step {} is listed after step {}; steps must be in ascending step_id order",
                        step.step_id, prev
                    )));
                }
                _ => {}
            }
            previous = Some(step.step_id);
        }

        Ok(())
    }

    /// `(step_id, variable)` pairs for references no earlier step binds.
    ///
    /// Diagnostic only: the engine never looks ahead and reports these as
    /// resolution failures when the step is reached.
    pub fn unbound_references(&self) -> Vec<(u32, String)> {
        let mut bound = HashSet::new();
        let mut unbound = Vec::new();
        for step in &self.steps {
            for root in step.references() {
                if !bound.contains(&root) {
                    unbound.push((step.step_id, root));
                }
            }
            if let Some(output) = step.output_variable() {
                bound.insert(output.to_string());
            }
        }
        unbound
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

/// Audit record for one attempted step. Retries of the same step fold into
/// a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionLog {
    pub step_id: u32,
    pub tool_name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock time across all attempts, serialized as milliseconds.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
}

impl StepExecutionLog {
    pub fn success(
        step: &WorkflowStep,
        output: Value,
        duration: Duration,
        attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step_id: step.step_id,
            tool_name: step.tool_name.clone(),
            status: StepStatus::Success,
            output: Some(output),
            error_message: None,
            error_kind: None,
            duration,
            attempts,
            started_at,
        }
    }

    pub fn failure(
        step: &WorkflowStep,
        error: &Error,
        duration: Duration,
        attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step_id: step.step_id,
            tool_name: step.tool_name.clone(),
            status: StepStatus::Failure,
            output: None,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
            duration,
            attempts,
            started_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

mod duration_ms {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(D::Error::custom(format!("invalid duration: {}ms", millis)));
        }
        Ok(Duration::from_secs_f64(millis / 1000.0))
    }
}
