//! Task data model for the execution DAG.
//!
//! Tasks are the atomic units of work assigned to specialist agents.
//! Each task tracks its status, dependencies, timing, and result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::WorkflowId;

/// Unique identifier for a task within a workflow.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task status in its lifecycle.
///
/// `Pending` and `Ready` are schedulable; `Completed`, `Failed`, and
/// `Skipped` are terminal. A task becomes `Skipped` when an ancestor
/// failed or the workflow was cancelled before the task ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created, dependencies not yet satisfied.
    #[default]
    Pending,
    /// Dependencies satisfied, waiting for a worker slot.
    Ready,
    /// Task is currently being executed by an agent.
    InProgress,
    /// Task completed successfully.
    Completed,
    /// Task failed after exhausting its attempt budget.
    Failed,
    /// Task will never execute (failed ancestor or cancellation).
    Skipped,
}

impl TaskStatus {
    /// Check whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// A single task in a workflow's execution DAG.
///
/// The workflow owns its tasks; `workflow_id` is an immutable
/// back-reference, not an ownership pointer. Dependencies are stored as
/// sibling task ids so the graph stays plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// The workflow this task belongs to.
    pub workflow_id: WorkflowId,
    /// Instruction text handed to the assigned agent.
    pub description: String,
    /// Name of the assigned agent, without the `@` prefix. Resolved
    /// against an injected directory at dispatch time.
    pub agent: String,
    /// Declared creation order. Stable tie-break for scheduling only,
    /// not an execution guarantee.
    pub order_index: usize,
    /// Sibling task ids that must complete before this task may start.
    pub depends_on: Vec<TaskId>,
    /// Current execution status.
    pub status: TaskStatus,
    /// Structured result, set only on `Completed`.
    pub output: Option<serde_json::Value>,
    /// Failure reason, set only on `Failed`.
    pub error: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task started execution.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached `Completed` or `Failed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowTask {
    /// Create a new pending task.
    pub fn new(workflow_id: WorkflowId, description: &str, agent: &str, order_index: usize) -> Self {
        Self {
            id: TaskId::new(),
            workflow_id,
            description: description.to_string(),
            agent: agent.to_string(),
            order_index,
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark the task as ready once its dependencies are satisfied.
    pub fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    /// Start the task execution, recording the start time.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Mark the task as successfully completed with its output.
    pub fn complete(&mut self, output: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
    }

    /// Mark the task as failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Mark the task as skipped. The task never executes, so no
    /// completion timestamp is recorded.
    pub fn skip(&mut self) {
        self.status = TaskStatus::Skipped;
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the task can be dispatched (Pending or Ready).
    pub fn is_schedulable(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Ready)
    }
}
