use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one run: `Pending -> Running -> {Completed, Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "Pending"),
            RunState::Running => write!(f, "Running"),
            RunState::Completed => write!(f, "Completed"),
            RunState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Lifecycle of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Resolving,
    Invoking,
    Retrying,
    Succeeded,
    Failed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepState::Pending => write!(f, "Pending"),
            StepState::Resolving => write!(f, "Resolving"),
            StepState::Invoking => write!(f, "Invoking"),
            StepState::Retrying => write!(f, "Retrying"),
            StepState::Succeeded => write!(f, "Succeeded"),
            StepState::Failed => write!(f, "Failed"),
        }
    }
}
