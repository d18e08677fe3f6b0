//! `astraflow` command line: run, plan, and inspect workflows.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use astraflow_engine::{
    config::Config,
    feedback::{FeedbackCollector, WorkflowEvaluation},
    generator::WorkflowGenerator,
    llm::{create_provider, LLMProvider},
    metrics,
    tools::{builtin_tools, Tool, ToolManifest, ToolRegistry},
    workflow::{RetryPolicy, RunOutcome, Workflow, WorkflowEngine},
};

#[derive(Parser)]
#[command(author, version, about = "Plan and execute tool workflows", long_about = None)]
struct Cli {
    /// Tool catalog (YAML) with remote and LLM tools
    #[arg(long, global = true)]
    tools: Option<PathBuf>,

    /// Print Prometheus metrics to stderr when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file (JSON or YAML)
    Run {
        #[arg(short, long)]
        workflow: PathBuf,

        /// Retry failed steps (overrides WORKFLOW_RETRY_ENABLED)
        #[arg(long)]
        retry: bool,

        /// Retry budget per step
        #[arg(long)]
        max_retries: Option<u32>,

        /// Skip schema validation before invoking tools
        #[arg(long)]
        no_validate: bool,

        /// Save the run as a feedback label
        #[arg(long)]
        record: bool,
    },

    /// Plan a request with the configured LLM
    Generate {
        request: String,

        /// Execute the plan right away
        #[arg(long)]
        execute: bool,
    },

    /// List registered tools
    Tools,

    /// Print the JSON Schema of a workflow file
    Schema,

    /// Inspect the feedback datastore
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommand,
    },
}

#[derive(Subcommand)]
enum FeedbackCommand {
    /// Label counts by outcome
    Stats,
    /// Most recent label ids
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Write training samples to a JSON file
    Export {
        output: PathBuf,
        #[arg(long)]
        successful_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    metrics::register_metrics()?;

    let code = match cli.command {
        Commands::Run {
            ref workflow,
            retry,
            max_retries,
            no_validate,
            record,
        } => {
            let workflow = read_workflow(workflow)?;
            let mut policy = config.retry_policy();
            if retry || max_retries.is_some() {
                let mut overridden = config.clone();
                overridden.workflow.retry_enabled = true;
                if let Some(budget) = max_retries {
                    overridden.workflow.max_retries = budget;
                }
                policy = overridden.retry_policy();
            }
            let validate = config.tools.validate_parameters && !no_validate;
            let registry = build_registry(&config, cli.tools.as_deref(), validate)?;
            let outcome = run(&registry, &workflow, policy).await?;
            if record {
                record_label(&config, &workflow, &outcome).await?;
            }
            exit_code(&outcome)
        }
        Commands::Generate { ref request, execute } => {
            let registry = build_registry(&config, cli.tools.as_deref(), config.tools.validate_parameters)?;
            let provider = create_provider(&config.llm)?;
            let generator = WorkflowGenerator::new(provider, config.llm.model.clone());
            let workflow = generator.generate(request, &registry.schemas()).await?;
            println!("{}", serde_json::to_string_pretty(&workflow)?);
            if execute {
                let outcome = run(&registry, &workflow, config.retry_policy()).await?;
                exit_code(&outcome)
            } else {
                ExitCode::SUCCESS
            }
        }
        Commands::Tools => {
            let registry = build_registry(&config, cli.tools.as_deref(), true)?;
            let listing: Vec<_> = registry
                .schemas()
                .into_iter()
                .map(|schema| {
                    json!({
                        "type": registry.tool_type(&schema.name).map(|k| k.to_string()),
                        "remote": registry.remote_info(&schema.name),
                        "schema": schema,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
            ExitCode::SUCCESS
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(Workflow);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            ExitCode::SUCCESS
        }
        Commands::Feedback { ref command } => {
            let collector = FeedbackCollector::new(&config.feedback.datastore_path).await?;
            match command {
                FeedbackCommand::Stats => {
                    println!("{}", serde_json::to_string_pretty(&collector.statistics().await?)?)
                }
                FeedbackCommand::List { limit } => {
                    for id in collector.list_labels(*limit).await? {
                        println!("{}", id);
                    }
                }
                FeedbackCommand::Export {
                    output,
                    successful_only,
                } => {
                    let count = collector.export_for_training(output, *successful_only).await?;
                    println!("Exported {} sample(s) to {}", count, output.display());
                }
            }
            ExitCode::SUCCESS
        }
    };

    if cli.metrics {
        eprintln!("{}", metrics::gather_metrics()?);
    }
    Ok(code)
}

fn read_workflow(path: &Path) -> Result<Workflow> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow {}", path.display()))?;
    let workflow: Workflow = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
        _ => serde_json::from_str(&text)?,
    };
    for (step_id, name) in workflow.unbound_references() {
        warn!(
            "Step {} reads $context.{} but no earlier step produces it",
            step_id, name
        );
    }
    Ok(workflow)
}

fn build_registry(config: &Config, catalog: Option<&Path>, validate: bool) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new().with_validation(validate);
    for (schema, tool) in builtin_tools() {
        registry.register(schema, Tool::Local(tool))?;
    }

    if let Some(path) = catalog {
        let manifest = ToolManifest::load(path)?;
        let provider: Option<Arc<dyn LLMProvider>> = match create_provider(&config.llm) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!("LLM provider unavailable: {:#}", e);
                None
            }
        };
        manifest.register_into(&mut registry, provider, &config.llm.model)?;
    }

    info!("{} tool(s) registered", registry.len());
    Ok(registry)
}

async fn run(registry: &ToolRegistry, workflow: &Workflow, policy: RetryPolicy) -> Result<RunOutcome> {
    let engine = WorkflowEngine::new(Arc::new(registry.clone())).with_retry_policy(policy);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current step");
            on_signal.cancel();
        }
    });

    let outcome = engine.execute_with_cancellation(workflow, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome)
}

async fn record_label(config: &Config, workflow: &Workflow, outcome: &RunOutcome) -> Result<()> {
    let evaluation = match outcome.failed_step() {
        None if outcome.is_completed() => {
            let last_output = outcome.logs.last().and_then(|log| log.output.clone());
            WorkflowEvaluation::success(last_output)
        }
        Some(log) => WorkflowEvaluation::failure(format!(
            "step {} failed: {}",
            log.step_id,
            log.error_message.as_deref().unwrap_or("unknown error")
        )),
        None => WorkflowEvaluation::failure("run was cancelled"),
    };

    let collector = FeedbackCollector::new(&config.feedback.datastore_path).await?;
    let label = collector.create_label(workflow, outcome.logs.clone(), evaluation);
    let path = collector.save(&label).await?;
    info!("Recorded {} at {}", label.label_id, path.display());
    Ok(())
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
