//! Feedback Collector
//!
//! Flat-file store of human-labelled runs, one pretty-printed JSON file per
//! label named `<label_id>_<timestamp>.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::workflow::{StepExecutionLog, Workflow};
use crate::Result;

const LABEL_PREFIX: &str = "label-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvaluation {
    /// Whether the run satisfied the original request.
    pub overall_success: bool,
    #[serde(default)]
    pub final_output: Option<Value>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub human_notes: Option<String>,
}

impl WorkflowEvaluation {
    pub fn success(final_output: Option<Value>) -> Self {
        Self {
            overall_success: true,
            final_output,
            failure_reason: None,
            human_notes: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            overall_success: false,
            final_output: None,
            failure_reason: Some(reason.into()),
            human_notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.human_notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackLabel {
    pub label_id: String,
    pub workflow_id: String,
    pub original_request: String,
    pub generated_workflow: Workflow,
    pub step_execution_logs: Vec<StepExecutionLog>,
    pub workflow_evaluation: WorkflowEvaluation,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackStatistics {
    pub total_labels: usize,
    pub successful_workflows: usize,
    pub failed_workflows: usize,
    pub datastore_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub original_request: String,
    pub generated_workflow: Workflow,
    pub execution_logs: Vec<StepExecutionLog>,
    pub overall_success: bool,
}

pub struct FeedbackCollector {
    datastore_path: PathBuf,
}

impl FeedbackCollector {
    /// Opens the store, creating the directory if needed.
    pub async fn new(datastore_path: impl Into<PathBuf>) -> Result<Self> {
        let datastore_path = datastore_path.into();
        fs::create_dir_all(&datastore_path).await?;
        info!("Feedback datastore at {}", datastore_path.display());
        Ok(Self { datastore_path })
    }

    pub fn datastore_path(&self) -> &Path {
        &self.datastore_path
    }

    pub fn create_label(
        &self,
        workflow: &Workflow,
        logs: Vec<StepExecutionLog>,
        evaluation: WorkflowEvaluation,
    ) -> FeedbackLabel {
        FeedbackLabel {
            label_id: format!("{}{}", LABEL_PREFIX, uuid::Uuid::new_v4()),
            workflow_id: workflow.workflow_id().to_string(),
            original_request: workflow.original_request().to_string(),
            generated_workflow: workflow.clone(),
            step_execution_logs: logs,
            workflow_evaluation: evaluation,
            created_at: Utc::now(),
        }
    }

    /// Writes the label and returns the file it landed in.
    pub async fn save(&self, label: &FeedbackLabel) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        let path = self
            .datastore_path
            .join(format!("{}_{}.json", label.label_id, timestamp));
        fs::write(&path, serde_json::to_vec_pretty(label)?).await?;
        info!("Saved feedback label to: {}", path.display());
        Ok(path)
    }

    /// Latest saved version of `label_id`, or `None` if it was never saved.
    pub async fn load(&self, label_id: &str) -> Result<Option<FeedbackLabel>> {
        let latest = self
            .label_files()
            .await?
            .into_iter()
            .find(|file| file.label_id == label_id);

        match latest {
            Some(file) => {
                let bytes = fs::read(&file.path).await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            None => {
                warn!("Label {} not found in datastore", label_id);
                Ok(None)
            }
        }
    }

    /// Label ids, newest save first.
    pub async fn list_labels(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let files = self.label_files().await?;
        Ok(files
            .into_iter()
            .map(|f| f.label_id)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    pub async fn statistics(&self) -> Result<FeedbackStatistics> {
        let labels = self.read_all().await?;
        let successful = labels
            .iter()
            .filter(|l| l.workflow_evaluation.overall_success)
            .count();
        Ok(FeedbackStatistics {
            total_labels: labels.len(),
            successful_workflows: successful,
            failed_workflows: labels.len() - successful,
            datastore_path: self.datastore_path.clone(),
        })
    }

    /// Writes a JSON array of training samples to `output`; returns how many
    /// were exported.
    pub async fn export_for_training(
        &self,
        output: impl AsRef<Path>,
        successful_only: bool,
    ) -> Result<usize> {
        let output = output.as_ref();
        let samples: Vec<TrainingSample> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|l| !successful_only || l.workflow_evaluation.overall_success)
            .map(|l| TrainingSample {
                original_request: l.original_request,
                generated_workflow: l.generated_workflow,
                execution_logs: l.step_execution_logs,
                overall_success: l.workflow_evaluation.overall_success,
            })
            .collect();

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(output, serde_json::to_vec_pretty(&samples)?).await?;
        info!(
            "Exported {} training samples to {}",
            samples.len(),
            output.display()
        );
        Ok(samples.len())
    }

    /// Every readable label; unreadable files are skipped with a warning.
    async fn read_all(&self) -> Result<Vec<FeedbackLabel>> {
        let mut labels = Vec::new();
        for file in self.label_files().await? {
            let parsed = match fs::read(&file.path).await {
                Ok(bytes) => serde_json::from_slice::<FeedbackLabel>(&bytes).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(label) => labels.push(label),
                Err(e) => warn!("Error reading file {}: {}", file.path.display(), e),
            }
        }
        Ok(labels)
    }

    /// Label files sorted newest first by their filename timestamp.
    async fn label_files(&self) -> Result<Vec<LabelFile>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.datastore_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(file) = LabelFile::parse(entry.path()) {
                files.push(file);
            }
        }
        files.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(files)
    }
}

struct LabelFile {
    label_id: String,
    timestamp: String,
    path: PathBuf,
}

impl LabelFile {
    fn parse(path: PathBuf) -> Option<Self> {
        if path.extension()? != "json" {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let (label_id, timestamp) = stem.split_once('_')?;
        if !label_id.starts_with(LABEL_PREFIX) {
            return None;
        }
        Some(Self {
            label_id: label_id.to_string(),
            timestamp: timestamp.to_string(),
            path,
        })
    }
}
