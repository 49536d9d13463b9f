//! Cooperative cancellation integration tests.

use std::time::Duration;

use conductor::core::task::TaskStatus;
use conductor::workflow::WorkflowStatus;

use crate::fixtures::{fast_config, harness_with_config, ScriptedWorker};

/// Cancel issued mid-execution: the in-flight task is signalled, the
/// pending tasks are skipped immediately, and the workflow is
/// cancelled regardless of the in-flight task's eventual outcome.
#[tokio::test]
async fn test_cancel_mid_execution_skips_pending_tasks() {
    let plan = "Task 1: @backend - A\nTask 2: @backend - B\nTask 3: @backend - C";
    let mut config = fast_config();
    config.max_concurrent_tasks = 1;
    let harness = harness_with_config(
        plan,
        vec![("backend", ScriptedWorker::slow(Duration::from_secs(30)))],
        config,
    );

    let id = harness.engine.create_workflow("cancel me").await.unwrap();

    let engine = harness.engine.clone();
    let runner = tokio::spawn(async move { engine.start(id).await });

    // Let the first task enter in_progress, then cancel.
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.engine.cancel(id).await.unwrap();
    runner.await.unwrap().unwrap();

    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Cancelled);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Skipped));
    assert!(workflow.completed_at.is_some());
}

/// Cancelling a workflow that was never started skips its tasks and
/// prevents any later start.
#[tokio::test]
async fn test_cancel_during_planning_phase() {
    let plan = "Task 1: @backend - A\nTask 2: @backend - B (depends on Task 1)";
    let backend = ScriptedWorker::instant();
    let harness = harness_with_config(plan, vec![("backend", backend.clone())], fast_config());

    let id = harness.engine.create_workflow("never runs").await.unwrap();
    harness.engine.cancel(id).await.unwrap();

    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Cancelled);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Skipped));
    assert_eq!(backend.call_count(), 0);

    assert!(harness.engine.start(id).await.is_err());
}

/// Cancelling an already-terminal workflow is a no-op: records and
/// task statuses are untouched.
#[tokio::test]
async fn test_cancel_terminal_workflow_is_noop() {
    let plan = "Task 1: @backend - A";
    let harness = harness_with_config(
        plan,
        vec![("backend", ScriptedWorker::instant())],
        fast_config(),
    );

    let id = harness.engine.create_workflow("finishes fast").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (before, _) = harness.engine.get(id).await.unwrap();
    assert_eq!(before.status, WorkflowStatus::Completed);
    let completed_at = before.completed_at;

    harness.engine.cancel(id).await.unwrap();
    harness.engine.cancel(id).await.unwrap();

    let (after, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(after.status, WorkflowStatus::Completed);
    assert_eq!(after.completed_at, completed_at);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
}

/// Exactly one workflow_cancelled event is published even when the
/// external cancel and the driver loop race to finalize.
#[tokio::test]
async fn test_cancel_publishes_single_event() {
    let plan = "Task 1: @backend - A\nTask 2: @backend - B";
    let mut config = fast_config();
    config.max_concurrent_tasks = 1;
    let mut harness = harness_with_config(
        plan,
        vec![("backend", ScriptedWorker::slow(Duration::from_secs(30)))],
        config,
    );

    let id = harness.engine.create_workflow("race").await.unwrap();
    let engine = harness.engine.clone();
    let runner = tokio::spawn(async move { engine.start(id).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.engine.cancel(id).await.unwrap();
    runner.await.unwrap().unwrap();

    let kinds = harness.drain_kinds();
    let cancelled = kinds
        .iter()
        .filter(|k| **k == "workflow_cancelled")
        .count();
    assert_eq!(cancelled, 1);
    // Nothing completed after the cancel.
    assert!(!kinds.contains(&"workflow_completed"));
}

/// A cancelled in-flight invocation that returns late is discarded:
/// the task stays skipped.
#[tokio::test]
async fn test_late_completion_discarded_after_cancel() {
    let plan = "Task 1: @backend - A";
    let harness = harness_with_config(
        plan,
        vec![("backend", ScriptedWorker::stubborn(Duration::from_millis(200)))],
        fast_config(),
    );

    let id = harness.engine.create_workflow("slow abort").await.unwrap();
    let engine = harness.engine.clone();
    let runner = tokio::spawn(async move { engine.start(id).await });

    tokio::time::sleep(Duration::from_millis(40)).await;
    harness.engine.cancel(id).await.unwrap();
    runner.await.unwrap().unwrap();

    // Give the late result time to arrive; it must not resurrect the task.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Cancelled);
    assert_eq!(tasks[0].status, TaskStatus::Skipped);
}
