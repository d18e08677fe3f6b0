pub mod context;
pub mod engine;
pub mod executor;
pub mod model;
pub mod resolve;
pub mod retry;
pub mod state;

pub use context::Context;
pub use engine::{RunOutcome, WorkflowEngine};
pub use executor::StepExecutor;
pub use model::{StepExecutionLog, StepStatus, Workflow, WorkflowStep};
pub use retry::RetryPolicy;
pub use state::{RunState, StepState};
