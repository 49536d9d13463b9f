//! Wavefront concurrency integration tests.

use std::time::Duration;

use conductor::core::task::TaskStatus;
use conductor::workflow::{ExecutionStrategy, WorkflowStatus};

use crate::fixtures::{fast_config, harness, harness_with_config, ScriptedWorker};

/// Two independent tasks run concurrently: their execution windows
/// overlap, and the workflow completes.
#[tokio::test]
async fn test_independent_tasks_overlap() {
    let plan = "Task 1: @backend - A\nTask 2: @frontend - B";
    let harness = harness(
        plan,
        vec![
            ("backend", ScriptedWorker::slow(Duration::from_millis(80))),
            ("frontend", ScriptedWorker::slow(Duration::from_millis(80))),
        ],
    );

    let id = harness.engine.create_workflow("parallel pair").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(workflow.plan.unwrap().strategy, ExecutionStrategy::Parallel);

    let (a_start, a_end) = (tasks[0].started_at.unwrap(), tasks[0].completed_at.unwrap());
    let (b_start, b_end) = (tasks[1].started_at.unwrap(), tasks[1].completed_at.unwrap());
    assert!(
        a_start < b_end && b_start < a_end,
        "windows should overlap: {:?}..{:?} vs {:?}..{:?}",
        a_start,
        a_end,
        b_start,
        b_end
    );
}

/// The worker limit caps in-flight tasks: with one slot, runs
/// serialize even though all tasks are ready at once.
#[tokio::test]
async fn test_worker_limit_serializes_execution() {
    let plan = "Task 1: @backend - A\nTask 2: @backend - B\nTask 3: @backend - C";
    let mut config = fast_config();
    config.max_concurrent_tasks = 1;
    let harness = harness_with_config(
        plan,
        vec![("backend", ScriptedWorker::slow(Duration::from_millis(30)))],
        config,
    );

    let id = harness.engine.create_workflow("throttled").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (_, tasks) = harness.engine.get(id).await.unwrap();
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

    let mut windows: Vec<_> = tasks
        .iter()
        .map(|t| (t.started_at.unwrap(), t.completed_at.unwrap()))
        .collect();
    windows.sort();
    for pair in windows.windows(2) {
        assert!(
            pair[1].0 >= pair[0].1,
            "execution windows overlapped despite a single worker slot"
        );
    }
}

/// A diamond DAG runs its middle wavefront concurrently and joins
/// before the final task.
#[tokio::test]
async fn test_diamond_wavefront() {
    let plan = "\
Task 1: @backend - Root
Task 2: @backend - Left (depends on Task 1)
Task 3: @backend - Right (depends on Task 1)
Task 4: @backend - Join (depends on Task 2, Task 3)";
    let harness = harness(
        plan,
        vec![("backend", ScriptedWorker::slow(Duration::from_millis(40)))],
    );

    let id = harness.engine.create_workflow("diamond").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);

    let root = &tasks[0];
    let left = &tasks[1];
    let right = &tasks[2];
    let join = &tasks[3];

    // Middle layer starts only after the root and overlaps.
    assert!(left.started_at.unwrap() >= root.completed_at.unwrap());
    assert!(right.started_at.unwrap() >= root.completed_at.unwrap());
    assert!(
        left.started_at.unwrap() < right.completed_at.unwrap()
            && right.started_at.unwrap() < left.completed_at.unwrap()
    );

    // The join waits for both middle tasks.
    assert!(join.started_at.unwrap() >= left.completed_at.unwrap());
    assert!(join.started_at.unwrap() >= right.completed_at.unwrap());

    // The join saw both dependency outputs.
    assert_eq!(join.output.as_ref().unwrap()["dependencies_seen"], 2);
}

/// Independent ready tasks may complete in either order; the engine
/// reaches the same terminal state regardless.
#[tokio::test]
async fn test_mixed_speed_branches_complete() {
    let plan = "Task 1: @slow - A\nTask 2: @fast - B";
    let harness = harness(
        plan,
        vec![
            ("slow", ScriptedWorker::slow(Duration::from_millis(60))),
            ("fast", ScriptedWorker::instant()),
        ],
    );

    let id = harness.engine.create_workflow("uneven pair").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    // The fast branch finished first even though it was declared second.
    assert!(tasks[1].completed_at.unwrap() <= tasks[0].completed_at.unwrap());
}
