//! Result aggregation over terminal task records.
//!
//! Pure post-processing: no scheduling decisions happen here. On
//! success the per-task outputs are merged into a single
//! `WorkflowResults`; on failure only the recorded task errors are
//! concatenated, in `order_index` order so the combined message is
//! deterministic.

use std::collections::BTreeMap;

use crate::core::task::{TaskStatus, WorkflowTask};
use crate::workflow::{Workflow, WorkflowResults};

/// Maximum characters of a task output quoted in the contributions map.
const EXCERPT_CHARS: usize = 200;

/// Merge completed task outputs into the workflow-level result.
pub fn aggregate_results(workflow: &Workflow, tasks: &[WorkflowTask]) -> WorkflowResults {
    let mut ordered: Vec<&WorkflowTask> = tasks.iter().collect();
    ordered.sort_by_key(|t| t.order_index);

    let completed: Vec<&WorkflowTask> = ordered
        .iter()
        .copied()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();

    let duration_seconds = match (workflow.started_at, workflow.completed_at) {
        (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
        _ => None,
    };

    let mut agent_contributions = BTreeMap::new();
    let mut artifacts = Vec::new();
    for task in &completed {
        if let Some(output) = &task.output {
            agent_contributions.insert(task.agent.clone(), excerpt(output));
            collect_artifacts(output, &mut artifacts);
        }
    }

    WorkflowResults {
        summary: format!("Completed {} of {} tasks", completed.len(), tasks.len()),
        completed_tasks: completed.len(),
        total_tasks: tasks.len(),
        duration_seconds,
        agent_contributions,
        artifacts,
    }
}

/// Concatenate failed-task errors into one workflow-level message.
///
/// Failed tasks are visited in `order_index` order so independently
/// failing branches always report in the same order.
pub fn concatenate_errors(tasks: &[WorkflowTask]) -> String {
    let mut failed: Vec<&WorkflowTask> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    failed.sort_by_key(|t| t.order_index);

    if failed.is_empty() {
        return "one or more tasks failed".to_string();
    }

    failed
        .iter()
        .map(|t| {
            format!(
                "Task {} (@{}): {}",
                t.order_index + 1,
                t.agent,
                t.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// A short, human-readable excerpt of a task output.
fn excerpt(output: &serde_json::Value) -> String {
    let text = match output {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    };
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Collect file/reference outputs from a task output's `artifacts`
/// array, preserving first-seen order across tasks.
fn collect_artifacts(output: &serde_json::Value, into: &mut Vec<String>) {
    if let Some(items) = output.get("artifacts").and_then(|a| a.as_array()) {
        for item in items {
            if let Some(path) = item.as_str() {
                if !into.iter().any(|existing| existing == path) {
                    into.push(path.to_string());
                }
            }
        }
    }
}
