//! Progress events and the injected event sink.
//!
//! The orchestration core knows nothing about transports; observers
//! inject an `EventSink` and receive one event per state transition,
//! in the order transitions occur. Delivery is best-effort publish
//! once: event loss never affects the state machine, which remains the
//! source of truth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::task::TaskId;
use crate::workflow::{WorkflowId, WorkflowResults};

/// Lifecycle events published for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum WorkflowEvent {
    /// A workflow record was created for a user request.
    WorkflowCreated {
        workflow_id: WorkflowId,
        description: String,
    },
    /// The plan parsed and validated; tasks are persisted.
    PlanReady {
        workflow_id: WorkflowId,
        total_tasks: usize,
        strategy: String,
    },
    /// Execution started.
    WorkflowStarted {
        workflow_id: WorkflowId,
        total_tasks: usize,
    },
    /// A task was dispatched to its agent.
    TaskStarted {
        workflow_id: WorkflowId,
        task_id: TaskId,
        agent: String,
        description: String,
    },
    /// A task completed successfully.
    TaskCompleted {
        workflow_id: WorkflowId,
        task_id: TaskId,
        output: serde_json::Value,
    },
    /// A task failed after exhausting its attempts.
    TaskFailed {
        workflow_id: WorkflowId,
        task_id: TaskId,
        error: String,
    },
    /// Completion progress across the whole workflow.
    WorkflowProgress {
        workflow_id: WorkflowId,
        completed: usize,
        total: usize,
        percent: u8,
    },
    /// Every task completed.
    WorkflowCompleted {
        workflow_id: WorkflowId,
        results: WorkflowResults,
    },
    /// The workflow failed.
    WorkflowFailed {
        workflow_id: WorkflowId,
        error: String,
    },
    /// The workflow was cancelled.
    WorkflowCancelled { workflow_id: WorkflowId },
}

impl WorkflowEvent {
    /// The snake_case kind tag for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowCreated { .. } => "workflow_created",
            WorkflowEvent::PlanReady { .. } => "plan_ready",
            WorkflowEvent::WorkflowStarted { .. } => "workflow_started",
            WorkflowEvent::TaskStarted { .. } => "task_started",
            WorkflowEvent::TaskCompleted { .. } => "task_completed",
            WorkflowEvent::TaskFailed { .. } => "task_failed",
            WorkflowEvent::WorkflowProgress { .. } => "workflow_progress",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
            WorkflowEvent::WorkflowFailed { .. } => "workflow_failed",
            WorkflowEvent::WorkflowCancelled { .. } => "workflow_cancelled",
        }
    }

    /// The workflow this event belongs to.
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            WorkflowEvent::WorkflowCreated { workflow_id, .. }
            | WorkflowEvent::PlanReady { workflow_id, .. }
            | WorkflowEvent::WorkflowStarted { workflow_id, .. }
            | WorkflowEvent::TaskStarted { workflow_id, .. }
            | WorkflowEvent::TaskCompleted { workflow_id, .. }
            | WorkflowEvent::TaskFailed { workflow_id, .. }
            | WorkflowEvent::WorkflowProgress { workflow_id, .. }
            | WorkflowEvent::WorkflowCompleted { workflow_id, .. }
            | WorkflowEvent::WorkflowFailed { workflow_id, .. }
            | WorkflowEvent::WorkflowCancelled { workflow_id } => *workflow_id,
        }
    }

    /// The task this event refers to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            WorkflowEvent::TaskStarted { task_id, .. }
            | WorkflowEvent::TaskCompleted { task_id, .. }
            | WorkflowEvent::TaskFailed { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }
}

/// Fire-and-forget sink for progress events.
///
/// Implementations must be safe to call concurrently. The engine never
/// depends on any observer.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: WorkflowEvent);
}

/// Sink that forwards events onto a tokio mpsc channel.
///
/// A closed or full channel drops the event; the engine never blocks
/// on slow observers.
pub struct ChannelSink {
    tx: mpsc::Sender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<WorkflowEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, event: WorkflowEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Sink that discards every event.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _event: WorkflowEvent) {}
}
