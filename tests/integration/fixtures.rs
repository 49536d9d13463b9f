//! Test fixtures for integration tests.
//!
//! Provides scripted planner and worker agents plus an engine harness
//! wired with the in-memory store and a channel event sink.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use conductor::config::EngineConfig;
use conductor::invoker::{AgentInvoker, InvocationContext, StaticDirectory};
use conductor::persist::MemoryStore;
use conductor::sink::ChannelSink;
use conductor::{Error, Result, WorkflowEngine, WorkflowEvent};

/// Planner agent that answers every invocation with a fixed plan text.
pub struct FixedPlanner {
    plan: String,
}

impl FixedPlanner {
    pub fn new(plan: &str) -> Arc<Self> {
        Arc::new(Self {
            plan: plan.to_string(),
        })
    }
}

#[async_trait]
impl AgentInvoker for FixedPlanner {
    async fn invoke(
        &self,
        _description: &str,
        _context: &InvocationContext,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value> {
        Ok(serde_json::Value::String(self.plan.clone()))
    }
}

/// Worker agent with scripted behavior: an optional delay, a number of
/// leading failures, and a call counter for dispatch assertions.
pub struct ScriptedWorker {
    delay: Duration,
    fail_times: u32,
    honors_cancel: bool,
    pub calls: AtomicU32,
}

impl ScriptedWorker {
    /// Succeeds immediately.
    pub fn instant() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail_times: 0,
            honors_cancel: true,
            calls: AtomicU32::new(0),
        })
    }

    /// Succeeds after sleeping for `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_times: 0,
            honors_cancel: true,
            calls: AtomicU32::new(0),
        })
    }

    /// Sleeps for `delay` ignoring the cancellation token, simulating
    /// an invocation that cannot abort promptly.
    pub fn stubborn(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_times: 0,
            honors_cancel: false,
            calls: AtomicU32::new(0),
        })
    }

    /// Fails every invocation.
    pub fn always_failing() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail_times: u32::MAX,
            honors_cancel: true,
            calls: AtomicU32::new(0),
        })
    }

    /// Fails the first `times` invocations, then succeeds.
    pub fn flaky(times: u32) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail_times: times,
            honors_cancel: true,
            calls: AtomicU32::new(0),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentInvoker for ScriptedWorker {
    async fn invoke(
        &self,
        description: &str,
        context: &InvocationContext,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            if self.honors_cancel {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(Error::Invocation("worker cancelled".to_string()))
                    }
                    _ = tokio::time::sleep(self.delay) => {}
                }
            } else {
                tokio::time::sleep(self.delay).await;
            }
        }
        if call <= self.fail_times {
            return Err(Error::Invocation(format!(
                "scripted failure {} for: {}",
                call, description
            )));
        }
        Ok(serde_json::json!({
            "response": format!("done: {}", description),
            "dependencies_seen": context.dependency_outputs.len(),
        }))
    }
}

/// An engine wired to scripted agents, plus the event receiver.
pub struct EngineHarness {
    pub engine: Arc<WorkflowEngine>,
    pub store: Arc<MemoryStore>,
    pub events: mpsc::Receiver<WorkflowEvent>,
}

impl EngineHarness {
    /// Drain every event received so far and return the kind tags.
    pub fn drain_kinds(&mut self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind());
        }
        kinds
    }
}

/// Engine config tuned so failing tests finish in milliseconds.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        max_concurrent_tasks: 4,
        task_timeout_secs: 10,
        max_task_attempts: 2,
        retry_base_delay_ms: 5,
        planner_agent: "orchestrator".to_string(),
    }
}

/// Build an engine whose planner answers with `plan` and whose workers
/// are the given named agents.
pub fn harness(plan: &str, workers: Vec<(&str, Arc<dyn AgentInvoker>)>) -> EngineHarness {
    harness_with_config(plan, workers, fast_config())
}

pub fn harness_with_config(
    plan: &str,
    workers: Vec<(&str, Arc<dyn AgentInvoker>)>,
    config: EngineConfig,
) -> EngineHarness {
    let mut directory = StaticDirectory::new().register("orchestrator", FixedPlanner::new(plan));
    for (name, worker) in workers {
        directory = directory.register(name, worker);
    }

    let store = Arc::new(MemoryStore::new());
    let (tx, events) = mpsc::channel(1024);
    let engine = WorkflowEngine::new(
        store.clone(),
        Arc::new(directory),
        Arc::new(ChannelSink::new(tx)),
        config,
    );

    EngineHarness {
        engine: Arc::new(engine),
        store,
        events,
    }
}
