//! Injected interfaces to the agents that actually perform work.
//!
//! The engine never talks to a model directly. It resolves a worker
//! name to a capability through an `AgentDirectory` and calls the
//! capability's `invoke`. New worker kinds require no change to the
//! executor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::workflow::WorkflowId;

/// Output of a completed dependency, handed to downstream tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyOutput {
    /// Description of the dependency task.
    pub task: String,
    /// Agent that produced the output.
    pub agent: String,
    /// The dependency's structured output.
    pub output: serde_json::Value,
}

/// Aggregated context passed along with every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationContext {
    /// The workflow this invocation belongs to.
    pub workflow_id: WorkflowId,
    /// The original user request.
    pub workflow_request: String,
    /// 1-based position of this task in the plan; 0 for the planning
    /// invocation itself.
    pub task_number: usize,
    /// Total number of tasks in the workflow.
    pub total_tasks: usize,
    /// Outputs of all directly-completed dependencies.
    pub dependency_outputs: Vec<DependencyOutput>,
}

impl InvocationContext {
    /// Context for the planning invocation, before any tasks exist.
    pub fn for_planning(workflow_id: WorkflowId, request: &str) -> Self {
        Self {
            workflow_id,
            workflow_request: request.to_string(),
            task_number: 0,
            total_tasks: 0,
            dependency_outputs: Vec::new(),
        }
    }
}

/// A callable worker capability.
///
/// Invocations are asynchronous, must be safe to call concurrently for
/// independent tasks, and should honor the cancellation token promptly
/// on a best-effort basis. The engine bounds every call with its own
/// timeout regardless.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        description: &str,
        context: &InvocationContext,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value>;
}

/// Name-based lookup of worker capabilities.
pub trait AgentDirectory: Send + Sync {
    /// Resolve a worker name (without `@`) to its capability.
    fn lookup(&self, name: &str) -> Option<Arc<dyn AgentInvoker>>;

    /// Check whether a worker name resolves.
    fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

/// Directory backed by a fixed name → capability map.
#[derive(Default)]
pub struct StaticDirectory {
    agents: HashMap<String, Arc<dyn AgentInvoker>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under a worker name.
    pub fn register(mut self, name: &str, invoker: Arc<dyn AgentInvoker>) -> Self {
        self.agents.insert(name.to_lowercase(), invoker);
        self
    }

    /// Registered worker names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

impl AgentDirectory for StaticDirectory {
    fn lookup(&self, name: &str) -> Option<Arc<dyn AgentInvoker>> {
        self.agents.get(&name.to_lowercase()).cloned()
    }
}
