//! Watch intake: turns task-set events into queued tasks.

use crate::pool::QueuedTask;
use flowhand_core::error::AgentError;
use flowhand_core::store::TaskSetStore;
use flowhand_core::taskset::{WatchEvent, WorkflowTaskSet};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to do after an event.
enum Flow {
    Continue,
    Stop,
}

/// Watches one task set and enqueues every task it lists.
pub struct Intake {
    store: Arc<dyn TaskSetStore>,
    task_set: String,
    queue: mpsc::Sender<QueuedTask>,
}

impl Intake {
    pub fn new(
        store: Arc<dyn TaskSetStore>,
        task_set: impl Into<String>,
        queue: mpsc::Sender<QueuedTask>,
    ) -> Self {
        Self {
            store,
            task_set: task_set.into(),
            queue,
        }
    }

    /// Run until the task set is deleted or completed, or `cancel` fires.
    ///
    /// A watch that ends without either is re-opened. Failing to open a
    /// watch and receiving an event that cannot be understood are fatal.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        loop {
            let mut events = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                events = self.store.watch(&self.task_set) => events.map_err(|source| {
                    AgentError::Subscribe {
                        name: self.task_set.clone(),
                        source,
                    }
                })?,
            };

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    next = events.next() => next,
                };

                let event = match next {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        return Err(AgentError::MalformedEvent {
                            event_type: "UNKNOWN".into(),
                            message: e.to_string(),
                        });
                    }
                    None => {
                        debug!(task_set = %self.task_set, "Watch ended, re-subscribing");
                        break;
                    }
                };

                match self.handle(event, cancel).await? {
                    Flow::Continue => {}
                    Flow::Stop => return Ok(()),
                }
            }
        }
    }

    async fn handle(
        &self,
        event: WatchEvent,
        cancel: &CancellationToken,
    ) -> Result<Flow, AgentError> {
        let event_type = event.event_type();
        match event {
            WatchEvent::Deleted => {
                info!(task_set = %self.task_set, event_type, "Task set deleted");
                Ok(Flow::Stop)
            }
            WatchEvent::Error(status) => Err(AgentError::MalformedEvent {
                event_type: event_type.into(),
                message: format!("{} ({}): {}", status.reason, status.code, status.message),
            }),
            WatchEvent::Added(task_set) | WatchEvent::Modified(task_set) => {
                info!(
                    task_set = %self.task_set,
                    event_type,
                    tasks = task_set.spec.tasks.len(),
                    "TaskSet event"
                );
                if task_set.is_completed() {
                    info!(task_set = %self.task_set, "Workflow completed");
                    return Ok(Flow::Stop);
                }
                Ok(self.enqueue(task_set, cancel).await)
            }
        }
    }

    /// Put every task on the queue, waiting for room as needed.
    async fn enqueue(&self, task_set: WorkflowTaskSet, cancel: &CancellationToken) -> Flow {
        for (node_id, template) in task_set.spec.tasks {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Flow::Stop,
                sent = self.queue.send(QueuedTask::fresh(node_id, template)) => sent,
            };
            if sent.is_err() {
                warn!(task_set = %self.task_set, "Task queue closed");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}
