use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::workflow::{RunState, StepExecutionLog, StepStatus};
use crate::{Error, ErrorKind, Result};

struct EngineMetrics {
    registry: Registry,
    runs_total: IntCounterVec,
    steps_total: IntCounterVec,
    step_retries_total: IntCounterVec,
    step_duration_seconds: HistogramVec,
}

impl EngineMetrics {
    fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let runs_total = IntCounterVec::new(
            Opts::new(
                "astraflow_workflow_runs_total",
                "Total number of workflow runs by final state.",
            ),
            &["outcome"],
        )?;
        let steps_total = IntCounterVec::new(
            Opts::new(
                "astraflow_steps_total",
                "Total number of settled steps by tool and status.",
            ),
            &["tool", "status"],
        )?;
        let step_retries_total = IntCounterVec::new(
            Opts::new(
                "astraflow_step_retries_total",
                "Total number of step retries by tool.",
            ),
            &["tool"],
        )?;
        let step_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "astraflow_step_duration_seconds",
                "Wall-clock step duration across all attempts.",
            ),
            &["tool"],
        )?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(steps_total.clone()))?;
        registry.register(Box::new(step_retries_total.clone()))?;
        registry.register(Box::new(step_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            steps_total,
            step_retries_total,
            step_duration_seconds,
        })
    }
}

lazy_static! {
    // Creation can only fail on malformed metric definitions; the error is
    // kept so register_metrics() can report it.
    static ref METRICS: std::result::Result<EngineMetrics, String> =
        EngineMetrics::new().map_err(|e| e.to_string());
}

fn metrics() -> Option<&'static EngineMetrics> {
    METRICS.as_ref().ok()
}

/// Forces metric creation and surfaces any registration failure.
pub fn register_metrics() -> Result<()> {
    match METRICS.as_ref() {
        Ok(_) => Ok(()),
        Err(message) => Err(Error::Metrics(prometheus::Error::Msg(message.clone()))),
    }
}

const UNKNOWN_TOOL: &str = "unknown";

/// Tool label for a step; names missing from the registry are `unknown`.
fn tool_label(log: &StepExecutionLog) -> &str {
    if log.error_kind == Some(ErrorKind::ToolNotFound) {
        UNKNOWN_TOOL
    } else {
        log.tool_name.as_str()
    }
}

pub fn record_step(log: &StepExecutionLog) {
    if let Some(m) = metrics() {
        let tool = tool_label(log);
        let status = match log.status {
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
        };
        m.steps_total
            .with_label_values(&[tool, status])
            .inc();
        m.step_duration_seconds
            .with_label_values(&[tool])
            .observe(log.duration.as_secs_f64());
    }
}

pub fn record_retry(tool: &str) {
    if let Some(m) = metrics() {
        m.step_retries_total.with_label_values(&[tool]).inc();
    }
}

pub fn record_run(state: RunState) {
    if let Some(m) = metrics() {
        m.runs_total
            .with_label_values(&[state.to_string().to_lowercase().as_str()])
            .inc();
    }
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> Result<String> {
    register_metrics()?;
    let Some(m) = metrics() else {
        return Ok(String::new());
    };
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder.encode(&m.registry.gather(), &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| Error::Metrics(prometheus::Error::Msg(e.to_string())))
}
