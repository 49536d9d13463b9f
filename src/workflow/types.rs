//! Core workflow type definitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a workflow instance.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Create a new unique workflow identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Status of a workflow in its lifecycle.
///
/// `planning → executing → {completed, failed, cancelled}`, with a
/// short-circuit from `planning` straight to `failed` when the plan is
/// malformed or cyclic, and to `cancelled` on an early cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow created, plan not yet validated.
    #[default]
    Planning,
    /// The executor is driving the task DAG.
    Executing,
    /// Every task completed.
    Completed,
    /// At least one task failed and no further progress was possible,
    /// or planning itself failed.
    Failed,
    /// An external cancel request short-circuited execution.
    Cancelled,
}

impl WorkflowStatus {
    /// Check whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Planning => write!(f, "planning"),
            WorkflowStatus::Executing => write!(f, "executing"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
            WorkflowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Execution strategy inferred from the dependency shape of a plan.
///
/// Never declared by the planner; derived once at validation time and
/// recorded for observers. The executor always runs the general
/// wavefront loop regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// No dependency edges; every task can run concurrently.
    Parallel,
    /// Tasks form chains; at most one predecessor and successor each.
    Sequential,
    /// Arbitrary DAG; the ready set may contain 1..N tasks at a time.
    Dag,
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStrategy::Parallel => write!(f, "parallel"),
            ExecutionStrategy::Sequential => write!(f, "sequential"),
            ExecutionStrategy::Dag => write!(f, "dag"),
        }
    }
}

/// The validated task plan attached to a workflow.
///
/// Set exactly once after the plan text parses and the dependency graph
/// validates; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// The orchestrating agent's response, kept verbatim.
    pub raw_text: String,
    /// Number of tasks materialized from the plan.
    pub total_tasks: usize,
    /// Inferred execution strategy.
    pub strategy: ExecutionStrategy,
}

/// Aggregated results of a successfully completed workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResults {
    /// Human-readable completion summary.
    pub summary: String,
    /// Number of tasks that completed.
    pub completed_tasks: usize,
    /// Total number of tasks in the workflow.
    pub total_tasks: usize,
    /// Wall-clock duration from start to completion.
    pub duration_seconds: Option<f64>,
    /// Agent name → truncated output excerpt, in deterministic order.
    pub agent_contributions: BTreeMap<String, String>,
    /// Union of file/reference outputs reported by tasks.
    pub artifacts: Vec<String>,
}

/// One user request's entire multi-task execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// Original user request, immutable.
    pub description: String,
    /// Current lifecycle status.
    pub status: WorkflowStatus,
    /// Validated plan, set once at creation time.
    pub plan: Option<Plan>,
    /// Aggregated results, set only on terminal success.
    pub results: Option<WorkflowResults>,
    /// Human-readable failure reason, set only on `Failed`.
    pub error: Option<String>,
    /// When the workflow record was created.
    pub created_at: DateTime<Utc>,
    /// When execution started. Set at most once.
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal state was reached. Set at most once.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// Create a new workflow in `Planning` for the given user request.
    pub fn new(description: &str) -> Self {
        Self {
            id: WorkflowId::new(),
            description: description.to_string(),
            status: WorkflowStatus::Planning,
            plan: None,
            results: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Attach the validated plan. Only meaningful during `Planning`.
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
    }

    /// Check whether this workflow has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
