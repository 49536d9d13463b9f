//! Workflow lifecycle types for the orchestration engine.
//!
//! This module provides the record types for one user request's
//! multi-task execution unit and the state machine that governs its
//! legal lifecycle transitions.

mod state;
mod types;

pub use state::{TransitionEntry, WorkflowState};
pub use types::{
    ExecutionStrategy, Plan, Workflow, WorkflowId, WorkflowResults, WorkflowStatus,
};
