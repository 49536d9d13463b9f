//! Workflow state management with status transition validation.
//!
//! This module provides `WorkflowState`, which wraps a `Workflow` and
//! enforces the legal lifecycle ordering:
//!
//! `planning → executing → {completed, failed, cancelled}`
//!
//! Planning may also short-circuit straight to `failed` (malformed or
//! cyclic plan) or `cancelled` (early cancel request). Terminal states
//! have no outgoing transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{Workflow, WorkflowStatus};

/// A record of a status transition with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEntry {
    /// The status that was entered.
    pub status: WorkflowStatus,
    /// When this status was entered.
    pub entered_at: DateTime<Utc>,
}

/// Manages a workflow's lifecycle and enforces valid transitions.
///
/// Besides validating the transition itself, `transition` applies the
/// status-specific record updates: `started_at` when entering
/// `Executing` and `completed_at` when entering a terminal state, each
/// set at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// The underlying workflow being managed.
    workflow: Workflow,
    /// History of all statuses visited, in order.
    history: Vec<TransitionEntry>,
}

impl WorkflowState {
    /// Create a new WorkflowState from an existing Workflow.
    ///
    /// The workflow's current status is recorded as the first history
    /// entry.
    pub fn new(workflow: Workflow) -> Self {
        let initial = workflow.status;
        Self {
            workflow,
            history: vec![TransitionEntry {
                status: initial,
                entered_at: Utc::now(),
            }],
        }
    }

    /// Check if a transition to the target status is valid from the
    /// current status.
    pub fn can_transition(&self, target: WorkflowStatus) -> bool {
        let current = self.workflow.status;
        matches!(
            (current, target),
            (WorkflowStatus::Planning, WorkflowStatus::Executing)
                | (WorkflowStatus::Planning, WorkflowStatus::Failed)
                | (WorkflowStatus::Planning, WorkflowStatus::Cancelled)
                | (WorkflowStatus::Executing, WorkflowStatus::Completed)
                | (WorkflowStatus::Executing, WorkflowStatus::Failed)
                | (WorkflowStatus::Executing, WorkflowStatus::Cancelled)
        )
    }

    /// Attempt to transition the workflow to a new status.
    ///
    /// Records the transition in the history and applies the
    /// status-specific timestamps. Returns an error if the transition
    /// is not legal.
    pub fn transition(&mut self, target: WorkflowStatus) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::InvalidStatusTransition {
                from: self.workflow.status.to_string(),
                to: target.to_string(),
            });
        }

        self.workflow.status = target;
        match target {
            WorkflowStatus::Executing => {
                if self.workflow.started_at.is_none() {
                    self.workflow.started_at = Some(Utc::now());
                }
            }
            status if status.is_terminal() => {
                if self.workflow.completed_at.is_none() {
                    self.workflow.completed_at = Some(Utc::now());
                }
            }
            _ => {}
        }
        self.history.push(TransitionEntry {
            status: target,
            entered_at: Utc::now(),
        });

        Ok(())
    }

    /// Get the current status of the workflow.
    pub fn current(&self) -> WorkflowStatus {
        self.workflow.status
    }

    /// Get the history of all statuses visited, in order.
    pub fn history(&self) -> &[TransitionEntry] {
        &self.history
    }

    /// Get a reference to the underlying workflow.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Get a mutable reference to the underlying workflow.
    pub fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    /// Consume the state wrapper and return the workflow record.
    pub fn into_workflow(self) -> Workflow {
        self.workflow
    }
}
