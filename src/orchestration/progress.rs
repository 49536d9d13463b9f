//! Ordered, de-duplicated progress emission.
//!
//! Every state transition produces exactly one event, published before
//! the triggering component proceeds to its next action. A single lock
//! serializes emission so observers see transitions in the order they
//! occurred; one-shot lifecycle events are de-duplicated so races
//! between the driver loop and an external cancel request cannot
//! publish the same transition twice.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::task::TaskId;
use crate::sink::{EventSink, WorkflowEvent};
use crate::workflow::WorkflowId;

type EventKey = (WorkflowId, &'static str, Option<TaskId>);

/// Serializing, de-duplicating wrapper around the injected sink.
pub struct ProgressEmitter {
    sink: Arc<dyn EventSink>,
    seen: Mutex<HashSet<EventKey>>,
}

impl ProgressEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Publish an event, holding the emission lock so ordering is
    /// preserved. Repeated one-shot events are dropped; progress
    /// events pass through unconditionally since each carries a new
    /// count.
    pub async fn emit(&self, event: WorkflowEvent) {
        let mut seen = self.seen.lock().await;
        if event.kind() != "workflow_progress" {
            let key = (event.workflow_id(), event.kind(), event.task_id());
            if !seen.insert(key) {
                return;
            }
        }
        self.sink.publish(event).await;
    }
}
