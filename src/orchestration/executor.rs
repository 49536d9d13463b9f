//! Wavefront task execution.
//!
//! A single driver loop owns every state transition for one workflow:
//! it recomputes the ready set, dispatches ready tasks onto the worker
//! pool up to the configured limit, and suspends on a completion
//! channel until any in-flight invocation finishes. Completion of one
//! task wakes the loop, which may unlock newly-ready dependents. The
//! loop exits once every task is terminal or the workflow is
//! cancelled.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::core::graph::TaskGraph;
use crate::core::task::{TaskId, TaskStatus, WorkflowTask};
use crate::error::{Error, Result};
use crate::invoker::{AgentDirectory, AgentInvoker, DependencyOutput, InvocationContext};
use crate::orchestration::progress::ProgressEmitter;
use crate::persist::WorkflowStore;
use crate::sink::WorkflowEvent;
use crate::workflow::Workflow;
use crate::{clog, clog_debug, clog_warn};

/// Result of one task invocation, reported back to the driver loop.
struct TaskOutcome {
    task_id: TaskId,
    result: Result<serde_json::Value>,
}

/// Drives a workflow's task DAG from `executing` to all-terminal.
pub struct TaskExecutor {
    store: Arc<dyn WorkflowStore>,
    directory: Arc<dyn AgentDirectory>,
    emitter: Arc<ProgressEmitter>,
    config: EngineConfig,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn AgentDirectory>,
        emitter: Arc<ProgressEmitter>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            directory,
            emitter,
            config,
        }
    }

    /// Run the driver loop until every task is terminal.
    ///
    /// Task records are mutated here and persisted on every
    /// transition; the caller decides the workflow's terminal status
    /// from the records afterwards. Cancellation drains promptly:
    /// non-terminal tasks are forced to `Skipped` and late completions
    /// from in-flight invocations are discarded.
    pub async fn run(
        &self,
        workflow: &Workflow,
        tasks: Vec<WorkflowTask>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let graph = TaskGraph::build(&tasks)?;
        let total = tasks.len();
        let mut records: HashMap<TaskId, WorkflowTask> =
            tasks.into_iter().map(|t| (t.id, t)).collect();
        let mut completed_count = records
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();

        let (tx, mut rx) = mpsc::channel::<TaskOutcome>(total.max(1));
        let mut in_flight = 0usize;

        clog!(
            "executor: workflow {} starting with {} tasks",
            workflow.id.short(),
            total
        );

        loop {
            if cancel.is_cancelled() {
                self.skip_remaining(&mut records).await?;
                return Ok(());
            }

            // Dispatch the current wavefront, bounded by the worker limit.
            let statuses: HashMap<TaskId, TaskStatus> =
                records.iter().map(|(id, t)| (*id, t.status)).collect();
            let mut ready = graph.ready_tasks(&statuses);
            ready.sort_by_key(|id| records[id].order_index);

            for task_id in ready {
                if in_flight >= self.config.max_concurrent_tasks {
                    // Queued: unblocked but waiting for a worker slot.
                    let task = self.record_mut(&mut records, task_id)?;
                    if task.status == TaskStatus::Pending {
                        task.mark_ready();
                        self.store.save_task(task).await?;
                    }
                    continue;
                }
                self.dispatch(workflow, &graph, &mut records, total, task_id, &tx, &cancel)
                    .await?;
                in_flight += 1;
            }

            if records.values().all(|t| t.is_terminal()) {
                clog!("executor: workflow {} all tasks terminal", workflow.id.short());
                return Ok(());
            }

            if in_flight == 0 {
                // Unreachable on a validated DAG, but never spin.
                return Err(Error::Validation(
                    "task dependency deadlock detected".to_string(),
                ));
            }

            // Suspend until any in-flight invocation finishes.
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    self.skip_remaining(&mut records).await?;
                    return Ok(());
                }
                outcome = rx.recv() => match outcome {
                    Some(outcome) => outcome,
                    None => {
                        return Err(Error::Validation(
                            "completion channel closed unexpectedly".to_string(),
                        ))
                    }
                },
            };
            in_flight -= 1;

            if cancel.is_cancelled() {
                // Result arrived after a cancel request; discard it.
                clog_warn!(
                    "executor: discarding late result for task {}",
                    outcome.task_id.short()
                );
                self.skip_remaining(&mut records).await?;
                return Ok(());
            }

            match outcome.result {
                Ok(output) => {
                    let workflow_id = workflow.id;
                    let task = self.record_mut(&mut records, outcome.task_id)?;
                    task.complete(output.clone());
                    let task_id = task.id;
                    self.store.save_task(task).await?;
                    self.emitter
                        .emit(WorkflowEvent::TaskCompleted {
                            workflow_id,
                            task_id,
                            output,
                        })
                        .await;

                    completed_count += 1;
                    self.emitter
                        .emit(WorkflowEvent::WorkflowProgress {
                            workflow_id,
                            completed: completed_count,
                            total,
                            percent: (completed_count * 100 / total.max(1)) as u8,
                        })
                        .await;
                }
                Err(err) => {
                    let message = err.to_string();
                    let workflow_id = workflow.id;
                    let task = self.record_mut(&mut records, outcome.task_id)?;
                    task.fail(&message);
                    let task_id = task.id;
                    self.store.save_task(task).await?;
                    self.emitter
                        .emit(WorkflowEvent::TaskFailed {
                            workflow_id,
                            task_id,
                            error: message,
                        })
                        .await;

                    // Everything downstream of a failed task is dead.
                    for descendant in graph.descendants(&outcome.task_id) {
                        let task = self.record_mut(&mut records, descendant)?;
                        if !task.is_terminal() {
                            task.skip();
                            self.store.save_task(task).await?;
                        }
                    }
                }
            }
        }
    }

    /// Transition one task to `InProgress` and spawn its invocation.
    ///
    /// The transition happens in the driver loop before the spawn, so
    /// a task is never dispatched twice even while the ready set is
    /// recomputed concurrently with completions.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        workflow: &Workflow,
        graph: &TaskGraph,
        records: &mut HashMap<TaskId, WorkflowTask>,
        total: usize,
        task_id: TaskId,
        tx: &mpsc::Sender<TaskOutcome>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Gather dependency outputs before mutating the record.
        let mut dep_ids = graph.dependencies(&task_id);
        dep_ids.sort_by_key(|id| records.get(id).map(|t| t.order_index).unwrap_or(usize::MAX));
        let dependency_outputs: Vec<DependencyOutput> = dep_ids
            .iter()
            .filter_map(|id| {
                let dep = records.get(id)?;
                dep.output.as_ref().map(|output| DependencyOutput {
                    task: dep.description.clone(),
                    agent: dep.agent.clone(),
                    output: output.clone(),
                })
            })
            .collect();

        let task = self.record_mut(records, task_id)?;
        let context = InvocationContext {
            workflow_id: workflow.id,
            workflow_request: workflow.description.clone(),
            task_number: task.order_index + 1,
            total_tasks: total,
            dependency_outputs,
        };

        task.start();
        self.store.save_task(task).await?;
        self.emitter
            .emit(WorkflowEvent::TaskStarted {
                workflow_id: workflow.id,
                task_id,
                agent: task.agent.clone(),
                description: task.description.clone(),
            })
            .await;

        clog_debug!(
            "executor: dispatching task {} to @{}",
            task_id.short(),
            task.agent
        );

        let invoker = self.directory.lookup(&task.agent);
        let agent = task.agent.clone();
        let description = task.description.clone();
        let config = self.config.clone();
        let tx = tx.clone();
        let child = cancel.child_token();

        tokio::spawn(async move {
            let result = match invoker {
                Some(invoker) => {
                    invoke_with_retry(invoker, &description, &context, &config, child).await
                }
                None => Err(Error::AgentNotFound(agent)),
            };
            let _ = tx.send(TaskOutcome { task_id, result }).await;
        });

        Ok(())
    }

    /// Force every non-terminal task to `Skipped` after cancellation.
    async fn skip_remaining(&self, records: &mut HashMap<TaskId, WorkflowTask>) -> Result<()> {
        for task in records.values_mut() {
            if !task.is_terminal() {
                task.skip();
                self.store.save_task(task).await?;
            }
        }
        Ok(())
    }

    fn record_mut<'a>(
        &self,
        records: &'a mut HashMap<TaskId, WorkflowTask>,
        id: TaskId,
    ) -> Result<&'a mut WorkflowTask> {
        records.get_mut(&id).ok_or(Error::TaskNotFound(id))
    }
}

/// Invoke an agent with a per-attempt timeout and exponential backoff.
///
/// Timeouts and invocation errors are retried alike, up to the
/// configured attempt budget. Cancellation aborts immediately, between
/// or during attempts.
async fn invoke_with_retry(
    invoker: Arc<dyn AgentInvoker>,
    description: &str,
    context: &InvocationContext,
    config: &EngineConfig,
    cancel: CancellationToken,
) -> Result<serde_json::Value> {
    let mut attempt: u32 = 1;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Invocation("invocation cancelled".to_string()))
            }
            invoked = tokio::time::timeout(
                config.task_timeout(),
                invoker.invoke(description, context, cancel.clone()),
            ) => match invoked {
                Ok(inner) => inner,
                Err(_) => Err(Error::TaskTimeout(config.task_timeout())),
            },
        };

        match result {
            Ok(output) => return Ok(output),
            Err(err) if attempt < config.max_task_attempts => {
                let delay = config.retry_base_delay() * 2u32.saturating_pow(attempt - 1);
                clog_warn!(
                    "invocation attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    config.max_task_attempts,
                    err,
                    delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(Error::Invocation("invocation cancelled".to_string()))
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
