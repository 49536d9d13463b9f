//! Failure propagation and planning-failure integration tests.

use conductor::core::task::TaskStatus;
use conductor::workflow::WorkflowStatus;
use conductor::Error;

use crate::fixtures::{harness, ScriptedWorker};

/// A task that exhausts its retries is failed, its dependent is
/// skipped without ever being dispatched, and the workflow fails.
#[tokio::test]
async fn test_failed_dependency_skips_dependent() {
    let plan = "Task 1: @backend - Create API\nTask 2: @qa - Test API (depends on Task 1)";
    let backend = ScriptedWorker::always_failing();
    let qa = ScriptedWorker::instant();
    let harness = harness(
        plan,
        vec![("backend", backend.clone()), ("qa", qa.clone())],
    );

    let id = harness.engine.create_workflow("doomed api").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[1].status, TaskStatus::Skipped);

    // Retried up to the attempt budget, then never again.
    assert_eq!(backend.call_count(), 2);
    // The dependent was never handed to its agent.
    assert_eq!(qa.call_count(), 0);

    // The workflow error names the failed task deterministically.
    let error = workflow.error.unwrap();
    assert!(error.contains("Task 1 (@backend)"));
}

/// Failure only kills the failed task's descendants; independent
/// branches still complete before the workflow is marked failed.
#[tokio::test]
async fn test_independent_branch_completes_despite_failure() {
    let plan = "\
Task 1: @backend - Doomed work
Task 2: @frontend - Independent work
Task 3: @qa - Downstream of doom (depends on Task 1)";
    let harness = harness(
        plan,
        vec![
            ("backend", ScriptedWorker::always_failing()),
            ("frontend", ScriptedWorker::instant()),
            ("qa", ScriptedWorker::instant()),
        ],
    );

    let id = harness.engine.create_workflow("mixed fate").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (workflow, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[1].status, TaskStatus::Completed);
    assert_eq!(tasks[2].status, TaskStatus::Skipped);
}

/// Transitive descendants of a failure are all skipped.
#[tokio::test]
async fn test_failure_propagates_transitively() {
    let plan = "\
Task 1: @backend - Root
Task 2: @backend - Middle (depends on Task 1)
Task 3: @backend - Leaf (depends on Task 2)";
    let harness = harness(plan, vec![("backend", ScriptedWorker::always_failing())]);

    let id = harness.engine.create_workflow("chain of doom").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (_, tasks) = harness.engine.get(id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[1].status, TaskStatus::Skipped);
    assert_eq!(tasks[2].status, TaskStatus::Skipped);
}

/// Two independently failing branches concatenate their errors in
/// order_index order.
#[tokio::test]
async fn test_multiple_failures_concatenate_deterministically() {
    let plan = "Task 1: @backend - A\nTask 2: @devops - B";
    let harness = harness(
        plan,
        vec![
            ("backend", ScriptedWorker::always_failing()),
            ("devops", ScriptedWorker::always_failing()),
        ],
    );

    let id = harness.engine.create_workflow("double doom").await.unwrap();
    harness.engine.start(id).await.unwrap();

    let (workflow, _) = harness.engine.get(id).await.unwrap();
    let error = workflow.error.unwrap();
    let backend_pos = error.find("Task 1 (@backend)").unwrap();
    let devops_pos = error.find("Task 2 (@devops)").unwrap();
    assert!(backend_pos < devops_pos);
}

/// A cyclic plan is rejected at validation time; the workflow fails
/// without ever reaching `executing` and no task is dispatched.
#[tokio::test]
async fn test_cyclic_plan_never_executes() {
    let plan = "\
Task 1: @a - X
Task 2: @b - Y (depends on Task 3)
Task 3: @c - Z (depends on Task 2)";
    let a = ScriptedWorker::instant();
    let b = ScriptedWorker::instant();
    let c = ScriptedWorker::instant();
    let mut harness = harness(
        plan,
        vec![("a", a.clone()), ("b", b.clone()), ("c", c.clone())],
    );

    let err = harness.engine.create_workflow("cyclic").await.unwrap_err();
    assert!(matches!(err, Error::CyclicPlan { .. }));

    // Find the workflow through its created event and verify it
    // short-circuited to failed.
    let created = harness.events.recv().await.unwrap();
    let (workflow, _) = harness.engine.get(created.workflow_id()).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert!(workflow.started_at.is_none());
    assert!(workflow.error.unwrap().contains("cycle"));

    assert_eq!(a.call_count(), 0);
    assert_eq!(b.call_count(), 0);
    assert_eq!(c.call_count(), 0);
}

/// A plan referencing an unregistered agent fails the workflow during
/// planning.
#[tokio::test]
async fn test_unknown_agent_fails_planning() {
    let harness = harness("Task 1: @ghost - Haunt", vec![]);
    let err = harness.engine.create_workflow("spooky").await.unwrap_err();
    match err {
        Error::AgentNotFound(name) => assert_eq!(name, "ghost"),
        other => panic!("expected AgentNotFound, got {:?}", other),
    }
}

/// Prose with no task lines fails parsing, and the failure event is
/// published.
#[tokio::test]
async fn test_malformed_plan_emits_failure_event() {
    let mut harness = harness("Sorry, I cannot help with that.", vec![]);
    let err = harness.engine.create_workflow("nope").await.unwrap_err();
    assert!(matches!(err, Error::PlanParse(_)));

    let kinds = harness.drain_kinds();
    assert_eq!(kinds, vec!["workflow_created", "workflow_failed"]);
}
