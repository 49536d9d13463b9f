//! Injected persistence for workflow and task records.
//!
//! The engine assumes nothing about the storage technology, only that
//! writes are durable before the next state transition reads them. An
//! in-memory store ships with the crate for embedding and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::task::{TaskId, WorkflowTask};
use crate::error::{Error, Result};
use crate::workflow::{Workflow, WorkflowId};

/// Durable storage for workflow and task records.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert or update a workflow record.
    async fn save_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Insert or update a task record.
    async fn save_task(&self, task: &WorkflowTask) -> Result<()>;

    /// Load a workflow by id.
    async fn load_workflow(&self, id: WorkflowId) -> Result<Workflow>;

    /// Load a single task by id.
    async fn load_task(&self, id: TaskId) -> Result<WorkflowTask>;

    /// List a workflow's tasks ordered by `order_index`.
    async fn list_tasks(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowTask>>;

    /// Delete a workflow and, cascading, all of its tasks.
    async fn delete_workflow(&self, id: WorkflowId) -> Result<()>;
}

#[derive(Default)]
struct MemoryStoreInner {
    workflows: HashMap<WorkflowId, Workflow>,
    tasks: HashMap<TaskId, WorkflowTask>,
}

/// In-memory reference implementation of `WorkflowStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored workflows.
    pub async fn workflow_count(&self) -> usize {
        self.inner.read().await.workflows.len()
    }

    /// All stored workflows, newest first.
    pub async fn list_workflows(&self) -> Vec<Workflow> {
        let inner = self.inner.read().await;
        let mut workflows: Vec<Workflow> = inner.workflows.values().cloned().collect();
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        workflows
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn save_task(&self, task: &WorkflowTask) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn load_workflow(&self, id: WorkflowId) -> Result<Workflow> {
        self.inner
            .read()
            .await
            .workflows
            .get(&id)
            .cloned()
            .ok_or(Error::WorkflowNotFound(id))
    }

    async fn load_task(&self, id: TaskId) -> Result<WorkflowTask> {
        self.inner
            .read()
            .await
            .tasks
            .get(&id)
            .cloned()
            .ok_or(Error::TaskNotFound(id))
    }

    async fn list_tasks(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowTask>> {
        let inner = self.inner.read().await;
        let mut tasks: Vec<WorkflowTask> = inner
            .tasks
            .values()
            .filter(|t| t.workflow_id == workflow_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.order_index);
        Ok(tasks)
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.workflows.remove(&id).is_none() {
            return Err(Error::WorkflowNotFound(id));
        }
        inner.tasks.retain(|_, t| t.workflow_id != id);
        Ok(())
    }
}
