use thiserror::Error;

use crate::core::task::TaskId;
use crate::workflow::WorkflowId;

/// Render cycle member ids in short form for error messages.
fn join_short(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.short())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Plan parse error: {0}")]
    PlanParse(String),

    #[error("Dependency cycle detected among tasks: {}", join_short(.cycle))]
    CyclicPlan { cycle: Vec<TaskId> },

    #[error("Agent not found: @{0}")]
    AgentNotFound(String),

    #[error("Task invocation failed: {0}")]
    Invocation(String),

    #[error("Task invocation timed out after {0:?}")]
    TaskTimeout(std::time::Duration),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
