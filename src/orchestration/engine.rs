//! Workflow engine: the control surface of the crate.
//!
//! Ties planning, validation, execution, and aggregation together
//! behind four operations: `create_workflow`, `start`, `cancel`, and
//! `get`. All collaborators (store, agent directory, event sink) are
//! injected; the engine owns only the lifecycle logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::core::graph::TaskGraph;
use crate::core::task::{TaskId, TaskStatus, WorkflowTask};
use crate::error::{Error, Result};
use crate::invoker::{AgentDirectory, InvocationContext};
use crate::orchestration::aggregate::{aggregate_results, concatenate_errors};
use crate::orchestration::executor::TaskExecutor;
use crate::orchestration::progress::ProgressEmitter;
use crate::persist::WorkflowStore;
use crate::plan::parse_plan;
use crate::sink::{EventSink, WorkflowEvent};
use crate::workflow::{Plan, Workflow, WorkflowId, WorkflowState, WorkflowStatus};
use crate::{clog, clog_error};

/// Multi-agent workflow orchestration engine.
///
/// One engine instance serves many workflows. Each workflow gets its
/// own identity-scoped lock and cancellation token, so two workflows
/// never contend with each other and within one workflow at most one
/// record mutation proceeds at a time.
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    directory: Arc<dyn AgentDirectory>,
    emitter: Arc<ProgressEmitter>,
    executor: TaskExecutor,
    config: EngineConfig,
    /// Cancellation tokens for workflows currently executing.
    active: StdMutex<HashMap<WorkflowId, CancellationToken>>,
    /// Identity-scoped record locks.
    locks: StdMutex<HashMap<WorkflowId, Arc<Mutex<()>>>>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn AgentDirectory>,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        let emitter = Arc::new(ProgressEmitter::new(sink));
        let executor = TaskExecutor::new(
            store.clone(),
            directory.clone(),
            emitter.clone(),
            config.clone(),
        );
        Self {
            store,
            directory,
            emitter,
            executor,
            config,
            active: StdMutex::new(HashMap::new()),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Create a workflow from a user request.
    ///
    /// Asks the planner agent for a decomposition plan, parses and
    /// validates it, and persists the task records (`Ready` for
    /// zero-dependency tasks, `Pending` otherwise). A malformed plan,
    /// a dependency cycle, or an unknown agent short-circuits the
    /// workflow straight to `Failed`; it never reaches `Executing`.
    pub async fn create_workflow(&self, request: &str) -> Result<WorkflowId> {
        let mut workflow = Workflow::new(request);
        let workflow_id = workflow.id;
        self.store.save_workflow(&workflow).await?;
        self.emitter
            .emit(WorkflowEvent::WorkflowCreated {
                workflow_id,
                description: request.to_string(),
            })
            .await;

        clog!(
            "engine: workflow {} created for request: {:.100}",
            workflow_id.short(),
            request
        );

        match self.plan_workflow(&mut workflow).await {
            Ok(()) => Ok(workflow_id),
            Err(err) => {
                clog_error!(
                    "engine: planning failed for workflow {}: {}",
                    workflow_id.short(),
                    err
                );
                let mut state = WorkflowState::new(workflow);
                state.transition(WorkflowStatus::Failed)?;
                state.workflow_mut().error = Some(err.to_string());
                self.store.save_workflow(state.workflow()).await?;
                self.emitter
                    .emit(WorkflowEvent::WorkflowFailed {
                        workflow_id,
                        error: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    /// Execute a workflow to a terminal state.
    ///
    /// Fires the single legal `Planning → Executing` transition, runs
    /// the executor until every task is terminal, then records the
    /// terminal workflow status. Long-running; callers typically spawn
    /// it and follow progress through the event sink.
    pub async fn start(&self, workflow_id: WorkflowId) -> Result<()> {
        let lock = self.workflow_lock(workflow_id);
        let cancel = CancellationToken::new();

        let (workflow, tasks) = {
            let _guard = lock.lock().await;
            let workflow = self.store.load_workflow(workflow_id).await?;
            let mut state = WorkflowState::new(workflow);
            state.transition(WorkflowStatus::Executing)?;
            let workflow = state.into_workflow();
            self.store.save_workflow(&workflow).await?;

            let tasks = self.store.list_tasks(workflow_id).await?;
            self.active
                .lock()
                .unwrap()
                .insert(workflow_id, cancel.clone());
            (workflow, tasks)
        };

        self.emitter
            .emit(WorkflowEvent::WorkflowStarted {
                workflow_id,
                total_tasks: tasks.len(),
            })
            .await;

        let run_result = self
            .executor
            .run(&workflow, tasks, cancel.child_token())
            .await;

        self.active.lock().unwrap().remove(&workflow_id);

        let _guard = lock.lock().await;
        let workflow = self.store.load_workflow(workflow_id).await?;
        if workflow.is_terminal() {
            // An external cancel already finalized the record.
            return Ok(());
        }

        let tasks = self.store.list_tasks(workflow_id).await?;
        let mut state = WorkflowState::new(workflow);

        if cancel.is_cancelled() {
            state.transition(WorkflowStatus::Cancelled)?;
            self.store.save_workflow(state.workflow()).await?;
            self.emitter
                .emit(WorkflowEvent::WorkflowCancelled { workflow_id })
                .await;
            return Ok(());
        }

        if let Err(err) = run_result {
            state.transition(WorkflowStatus::Failed)?;
            state.workflow_mut().error = Some(err.to_string());
            self.store.save_workflow(state.workflow()).await?;
            self.emitter
                .emit(WorkflowEvent::WorkflowFailed {
                    workflow_id,
                    error: err.to_string(),
                })
                .await;
            return Err(err);
        }

        if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
            state.transition(WorkflowStatus::Completed)?;
            let results = aggregate_results(state.workflow(), &tasks);
            state.workflow_mut().results = Some(results.clone());
            self.store.save_workflow(state.workflow()).await?;
            clog!("engine: workflow {} completed", workflow_id.short());
            self.emitter
                .emit(WorkflowEvent::WorkflowCompleted {
                    workflow_id,
                    results,
                })
                .await;
        } else {
            let error = concatenate_errors(&tasks);
            state.transition(WorkflowStatus::Failed)?;
            state.workflow_mut().error = Some(error.clone());
            self.store.save_workflow(state.workflow()).await?;
            clog!("engine: workflow {} failed: {}", workflow_id.short(), error);
            self.emitter
                .emit(WorkflowEvent::WorkflowFailed { workflow_id, error })
                .await;
        }

        Ok(())
    }

    /// Cancel a workflow.
    ///
    /// Cancelling an already-terminal workflow is a no-op. Otherwise
    /// the workflow is marked `Cancelled` immediately, every
    /// non-terminal task is forced to `Skipped`, and in-flight
    /// invocations are signalled to abort; a task that cannot abort
    /// promptly may finish, but its result is discarded.
    pub async fn cancel(&self, workflow_id: WorkflowId) -> Result<()> {
        // Signal the driver loop before touching records so in-flight
        // work stops as soon as possible.
        let token = self.active.lock().unwrap().get(&workflow_id).cloned();
        if let Some(token) = token {
            token.cancel();
        }

        let lock = self.workflow_lock(workflow_id);
        let _guard = lock.lock().await;

        let workflow = self.store.load_workflow(workflow_id).await?;
        if workflow.is_terminal() {
            return Ok(());
        }

        for mut task in self.store.list_tasks(workflow_id).await? {
            if !task.is_terminal() {
                task.skip();
                self.store.save_task(&task).await?;
            }
        }

        let mut state = WorkflowState::new(workflow);
        state.transition(WorkflowStatus::Cancelled)?;
        self.store.save_workflow(state.workflow()).await?;
        clog!("engine: workflow {} cancelled", workflow_id.short());
        self.emitter
            .emit(WorkflowEvent::WorkflowCancelled { workflow_id })
            .await;
        Ok(())
    }

    /// Fetch a workflow and its tasks.
    pub async fn get(&self, workflow_id: WorkflowId) -> Result<(Workflow, Vec<WorkflowTask>)> {
        let workflow = self.store.load_workflow(workflow_id).await?;
        let tasks = self.store.list_tasks(workflow_id).await?;
        Ok((workflow, tasks))
    }

    /// Delete a workflow and its tasks. Refused while executing;
    /// cancel first.
    pub async fn delete(&self, workflow_id: WorkflowId) -> Result<()> {
        let lock = self.workflow_lock(workflow_id);
        let _guard = lock.lock().await;

        let workflow = self.store.load_workflow(workflow_id).await?;
        if workflow.status == WorkflowStatus::Executing {
            return Err(Error::Validation(
                "cannot delete a workflow while it is executing".to_string(),
            ));
        }
        self.store.delete_workflow(workflow_id).await
    }

    /// Ask the planner agent for a plan, validate it, and persist the
    /// task records.
    async fn plan_workflow(&self, workflow: &mut Workflow) -> Result<()> {
        let planner = self
            .directory
            .lookup(&self.config.planner_agent)
            .ok_or_else(|| Error::AgentNotFound(self.config.planner_agent.clone()))?;

        let prompt = planning_prompt(&workflow.description);
        let context = InvocationContext::for_planning(workflow.id, &workflow.description);
        let raw = planner
            .invoke(&prompt, &context, CancellationToken::new())
            .await?;
        let plan_text = match &raw {
            serde_json::Value::String(text) => text.clone(),
            other => other
                .get("response")
                .and_then(|r| r.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        };

        let specs = parse_plan(&plan_text)?;

        // Every assigned worker must resolve before any task exists.
        for spec in &specs {
            if !self.directory.contains(&spec.agent) {
                return Err(Error::AgentNotFound(spec.agent.clone()));
            }
        }

        // Map local plan indices to generated task ids.
        let mut tasks: Vec<WorkflowTask> = specs
            .iter()
            .map(|spec| {
                WorkflowTask::new(
                    workflow.id,
                    &spec.description,
                    &spec.agent,
                    spec.local_index - 1,
                )
            })
            .collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for (task, spec) in tasks.iter_mut().zip(&specs) {
            task.depends_on = spec
                .depends_on_local
                .iter()
                .map(|&dep| ids[dep - 1])
                .collect();
        }

        let graph = TaskGraph::build(&tasks)?;
        graph.validate()?;
        let strategy = graph.infer_strategy();

        for task in &mut tasks {
            if task.depends_on.is_empty() {
                task.mark_ready();
            }
        }
        for task in &tasks {
            self.store.save_task(task).await?;
        }

        workflow.set_plan(Plan {
            raw_text: plan_text,
            total_tasks: tasks.len(),
            strategy,
        });
        self.store.save_workflow(workflow).await?;

        clog!(
            "engine: workflow {} plan ready with {} tasks ({})",
            workflow.id.short(),
            tasks.len(),
            strategy
        );
        self.emitter
            .emit(WorkflowEvent::PlanReady {
                workflow_id: workflow.id,
                total_tasks: tasks.len(),
                strategy: strategy.to_string(),
            })
            .await;
        Ok(())
    }

    fn workflow_lock(&self, workflow_id: WorkflowId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(workflow_id)
            .or_default()
            .clone()
    }
}

/// Build the prompt asking the planner agent for a task breakdown.
fn planning_prompt(request: &str) -> String {
    format!(
        "Create a detailed task plan for this request:\n\
         \n\
         {request}\n\
         \n\
         Break this down into specific, actionable tasks. For each task:\n\
         1. Assign it to the appropriate agent with an @ symbol\n\
         2. Provide a clear description of what needs to be done\n\
         3. Identify any dependencies on other tasks\n\
         \n\
         Use this EXACT format (very important):\n\
         \n\
         Task 1: @agent_name - Description of task 1\n\
         Task 2: @agent_name - Description of task 2 (depends on Task 1)\n\
         Task 3: @agent_name - Description of task 3\n\
         Task 4: @agent_name - Description of task 4 (depends on Task 2, Task 3)\n\
         \n\
         Guidelines:\n\
         - Number tasks sequentially starting from 1\n\
         - Always specify the agent with the @ symbol\n\
         - Keep descriptions specific and actionable\n\
         - Only add dependencies if a task actually requires previous task outputs\n\
         - Think about what can run in parallel vs. sequentially\n\
         \n\
         Create the plan now:"
    )
}
