use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    metrics,
    tools::ToolRegistry,
    workflow::{Context, RetryPolicy, RunState, StepExecutionLog, StepExecutor, Workflow},
    Result,
};

/// Result of one run: the log of every attempted step and the context built
/// before the run settled.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub workflow_id: String,
    pub state: RunState,
    pub cancelled: bool,
    pub logs: Vec<StepExecutionLog>,
    pub context: Context,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// The entry that aborted the run, if any.
    pub fn failed_step(&self) -> Option<&StepExecutionLog> {
        self.logs.iter().find(|log| !log.is_success())
    }

    pub fn into_parts(self) -> (Vec<StepExecutionLog>, Context) {
        (self.logs, self.context)
    }
}

/// The master control plane: executes a workflow's steps strictly in order,
/// threading each output into the context for later steps.
///
/// The first step that settles as failed aborts the run; later steps are
/// neither attempted nor logged.
pub struct WorkflowEngine {
    executor: StepExecutor,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            executor: StepExecutor::new(registry, RetryPolicy::None),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        info!(
            "Workflow engine retry: {} (max_retries: {})",
            retry_policy.is_enabled(),
            retry_policy.max_retries()
        );
        self.executor = self.executor.with_retry_policy(retry_policy);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.executor.retry_policy()
    }

    pub async fn execute(&self, workflow: &Workflow) -> Result<RunOutcome> {
        self.execute_with_cancellation(workflow, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but stops before the next step once
    /// `cancel` fires. An in-flight step always runs to completion.
    pub async fn execute_with_cancellation(
        &self,
        workflow: &Workflow,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        workflow.validate()?;

        let mut state = RunState::Pending;
        debug!("Workflow {} is {}", workflow.workflow_id(), state);

        info!("Starting workflow execution: {}", workflow.workflow_id());
        info!("Original request: {}", workflow.original_request());
        state = RunState::Running;

        let total = workflow.steps().len();
        let mut context = Context::new();
        let mut logs = Vec::with_capacity(total);
        let mut cancelled = false;

        for (idx, step) in workflow.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "Workflow {} cancelled before step {}",
                    workflow.workflow_id(),
                    step.step_id
                );
                cancelled = true;
                state = RunState::Aborted;
                break;
            }

            info!(
                "Executing step {}/{} (id {}, tool '{}'): {}",
                idx + 1,
                total,
                step.step_id,
                step.tool_name,
                step.description
            );

            let log = self.executor.execute_step(step, &context).await;
            metrics::record_step(&log);

            if log.is_success() {
                if let (Some(variable), Some(output)) = (step.output_variable(), &log.output) {
                    if context.bind(variable, output.clone()).is_some() {
                        debug!("Context variable '{}' overwritten by step {}", variable, step.step_id);
                    }
                    info!(
                        "Step {} succeeded. Output stored in context['{}']",
                        step.step_id, variable
                    );
                } else {
                    info!("Step {} succeeded", step.step_id);
                }
                logs.push(log);
            } else {
                error!(
                    "Step {} failed: {}",
                    step.step_id,
                    log.error_message.as_deref().unwrap_or("unknown error")
                );
                info!(
                    "Aborting workflow {}; {} remaining step(s) not run",
                    workflow.workflow_id(),
                    total - idx - 1
                );
                logs.push(log);
                state = RunState::Aborted;
                break;
            }
        }

        if state == RunState::Running {
            state = RunState::Completed;
        }
        metrics::record_run(state);
        info!("Workflow {} finished: {}", workflow.workflow_id(), state);

        Ok(RunOutcome {
            workflow_id: workflow.workflow_id().to_string(),
            state,
            cancelled,
            logs,
            context,
        })
    }
}
