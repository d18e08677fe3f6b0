use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    metrics,
    tools::ToolRegistry,
    workflow::{
        resolve::resolve_parameters, Context, RetryPolicy, StepExecutionLog, StepState,
        WorkflowStep,
    },
    Error,
};

/// Runs one step to a settled log entry: resolve, invoke, and retry while
/// the failure is retryable and the budget allows.
///
/// Every attempt re-resolves the parameters and re-invokes the tool from
/// scratch. Side effects of a failed attempt are not rolled back.
pub struct StepExecutor {
    registry: Arc<ToolRegistry>,
    retry_policy: RetryPolicy,
}

impl StepExecutor {
    pub fn new(registry: Arc<ToolRegistry>, retry_policy: RetryPolicy) -> Self {
        Self {
            registry,
            retry_policy,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub async fn execute_step(&self, step: &WorkflowStep, context: &Context) -> StepExecutionLog {
        debug!("Step {} -> {}", step.step_id, StepState::Pending);
        let started_at = Utc::now();
        let start = Instant::now();
        let mut retry: u32 = 0;

        loop {
            let attempts = retry + 1;
            match self.attempt(step, context).await {
                Ok(output) => {
                    debug!("Step {} -> {}", step.step_id, StepState::Succeeded);
                    return StepExecutionLog::success(
                        step,
                        output,
                        start.elapsed(),
                        attempts,
                        started_at,
                    );
                }
                Err(err) if err.is_retryable() => {
                    let Some(delay) = self.retry_policy.delay_for_retry(retry) else {
                        if self.retry_policy.is_enabled() {
                            warn!(
                                "Step {} failed after {} attempts: {}",
                                step.step_id, attempts, err
                            );
                        }
                        return self.failed(step, &err, start, attempts, started_at);
                    };
                    retry += 1;
                    warn!(
                        "Step {} failed (attempt {}/{}): {}",
                        step.step_id,
                        attempts,
                        self.retry_policy.max_retries() + 1,
                        err
                    );
                    info!(
                        "Step {} -> {}, retrying in {:?}",
                        step.step_id,
                        StepState::Retrying,
                        delay
                    );
                    metrics::record_retry(&step.tool_name);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return self.failed(step, &err, start, attempts, started_at),
            }
        }
    }

    async fn attempt(&self, step: &WorkflowStep, context: &Context) -> crate::Result<serde_json::Value> {
        debug!("Step {} -> {}", step.step_id, StepState::Resolving);
        let arguments = resolve_parameters(&step.parameters, context).map_err(Error::from)?;
        debug!("Resolved parameters for step {}: {:?}", step.step_id, arguments);

        debug!("Step {} -> {}", step.step_id, StepState::Invoking);
        self.registry.invoke(&step.tool_name, arguments).await
    }

    fn failed(
        &self,
        step: &WorkflowStep,
        err: &Error,
        start: Instant,
        attempts: u32,
        started_at: chrono::DateTime<Utc>,
    ) -> StepExecutionLog {
        debug!("Step {} -> {}", step.step_id, StepState::Failed);
        StepExecutionLog::failure(step, err, start.elapsed(), attempts, started_at)
    }
}
