use astraflow_engine::{
    feedback::{FeedbackCollector, TrainingSample, WorkflowEvaluation},
    tools::{builtin_tools, Tool, ToolRegistry},
    workflow::{Workflow, WorkflowEngine, WorkflowStep},
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for (schema, tool) in builtin_tools() {
        registry.register(schema, Tool::Local(tool)).unwrap();
    }
    registry
}

fn workflow(b: i64) -> Workflow {
    Workflow::new(
        format!("add 2 and {} then multiply by 10", b),
        vec![
            WorkflowStep::new(1, "add")
                .with_param("a", 2)
                .with_param("b", b)
                .with_output("sum"),
            WorkflowStep::new(2, "multiply")
                .with_param("value", "$context.sum")
                .with_param("factor", 10)
                .with_output("result"),
        ],
    )
}

#[tokio::test]
async fn test_label_round_trip_and_listing() {
    let dir = TempDir::new().unwrap();
    let collector = FeedbackCollector::new(dir.path().join("labels")).await.unwrap();
    let engine = WorkflowEngine::new(Arc::new(registry()));

    let first = workflow(3);
    let (logs, context) = engine.execute(&first).await.unwrap().into_parts();
    let label = collector.create_label(
        &first,
        logs,
        WorkflowEvaluation::success(context.get("result").cloned()).with_notes("correct"),
    );
    let saved = collector.save(&label).await.unwrap();
    assert!(saved
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with(&format!("{}_", label.label_id)));

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = workflow(4);
    let (logs, _) = engine.execute(&second).await.unwrap().into_parts();
    let failed = collector.create_label(&second, logs, WorkflowEvaluation::failure("wrong factor"));
    collector.save(&failed).await.unwrap();

    let loaded = collector.load(&label.label_id).await.unwrap().unwrap();
    assert_eq!(loaded.label_id, label.label_id);
    assert_eq!(loaded.generated_workflow, first);
    assert_eq!(loaded.step_execution_logs.len(), 2);
    assert_eq!(loaded.workflow_evaluation.final_output, Some(json!(50)));
    assert!(collector.load("label-missing").await.unwrap().is_none());

    let ids = collector.list_labels(None).await.unwrap();
    assert_eq!(ids, vec![failed.label_id.clone(), label.label_id.clone()]);
    assert_eq!(collector.list_labels(Some(1)).await.unwrap(), vec![failed.label_id.clone()]);

    let stats = collector.statistics().await.unwrap();
    assert_eq!(stats.total_labels, 2);
    assert_eq!(stats.successful_workflows, 1);
    assert_eq!(stats.failed_workflows, 1);
}

#[tokio::test]
async fn test_export_for_training() {
    let dir = TempDir::new().unwrap();
    let collector = FeedbackCollector::new(dir.path()).await.unwrap();
    let engine = WorkflowEngine::new(Arc::new(registry()));

    for (b, success) in [(1, true), (2, false), (3, true)] {
        let wf = workflow(b);
        let (logs, _) = engine.execute(&wf).await.unwrap().into_parts();
        let evaluation = if success {
            WorkflowEvaluation::success(None)
        } else {
            WorkflowEvaluation::failure("not what was asked")
        };
        collector
            .save(&collector.create_label(&wf, logs, evaluation))
            .await
            .unwrap();
    }
    // Stray files in the datastore are ignored.
    std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

    let output = dir.path().join("export/train.json");
    assert_eq!(collector.export_for_training(&output, true).await.unwrap(), 2);
    let samples: Vec<TrainingSample> =
        serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    assert!(samples.iter().all(|s| s.overall_success));
    assert!(samples.iter().all(|s| s.execution_logs.len() == 2));

    assert_eq!(collector.export_for_training(&output, false).await.unwrap(), 3);
}
