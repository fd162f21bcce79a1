//! Worker pool: executes queued tasks and reports their results.
//!
//! Workers share one task queue and one result queue. A fresh delivery is
//! executed only if its node id has not been considered before; a requeued
//! delivery was already claimed by the execution that scheduled it and runs
//! again unconditionally.

use crate::dedup::DedupGuard;
use flowhand_core::NodeId;
use flowhand_core::error::ExecutionError;
use flowhand_core::node::NodeResult;
use flowhand_core::template::Template;
use flowhand_executor::{Execution, TemplateDispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Where a queued task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Read from the task set by the watch
    Fresh,
    /// Re-submitted after a requeue delay
    Requeued,
}

/// One unit of work on the task queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTask {
    pub node_id: NodeId,
    pub template: Template,
    pub delivery: Delivery,
}

impl QueuedTask {
    pub fn fresh(node_id: impl Into<NodeId>, template: Template) -> Self {
        Self {
            node_id: node_id.into(),
            template,
            delivery: Delivery::Fresh,
        }
    }
}

/// One entry on the result queue.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub node_id: NodeId,
    pub result: NodeResult,
}

/// A fixed number of workers draining the task queue.
pub struct WorkerPool {
    dispatcher: TemplateDispatcher,
    dedup: Arc<DedupGuard>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(dispatcher: TemplateDispatcher, workers: usize) -> Self {
        Self {
            dispatcher,
            dedup: Arc::new(DedupGuard::new()),
            workers: workers.max(1),
        }
    }

    /// The considered set shared by all workers.
    pub fn dedup(&self) -> Arc<DedupGuard> {
        self.dedup.clone()
    }

    /// Start the workers.
    ///
    /// `requeue` is the sending side of the task queue and is used for
    /// delayed re-submissions. Workers stop when `cancel` fires or the task
    /// queue closes.
    pub fn spawn(
        self,
        tasks: mpsc::Receiver<QueuedTask>,
        requeue: mpsc::Sender<QueuedTask>,
        results: mpsc::Sender<TaskResult>,
        cancel: CancellationToken,
    ) -> JoinSet<()> {
        let tasks = Arc::new(Mutex::new(tasks));
        let worker = Arc::new(Worker {
            dispatcher: self.dispatcher,
            dedup: self.dedup,
            requeue,
            results,
            cancel,
        });

        let mut set = JoinSet::new();
        for id in 0..self.workers {
            let worker = worker.clone();
            let tasks = tasks.clone();
            set.spawn(async move { worker.run(id, tasks).await });
        }
        debug!(workers = self.workers, "Worker pool started");
        set
    }
}

struct Worker {
    dispatcher: TemplateDispatcher,
    dedup: Arc<DedupGuard>,
    requeue: mpsc::Sender<QueuedTask>,
    results: mpsc::Sender<TaskResult>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(&self, id: usize, tasks: Arc<Mutex<mpsc::Receiver<QueuedTask>>>) {
        loop {
            let task = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                task = async { tasks.lock().await.recv().await } => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.process(task).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    async fn process(&self, task: QueuedTask) {
        let node_id = task.node_id.clone();
        if self.cancel.is_cancelled() {
            debug!(node_id = %node_id, "Agent stopping, task not started");
            return;
        }

        match task.delivery {
            Delivery::Fresh => {
                if !self.dedup.try_claim(&node_id) {
                    info!(node_id = %node_id, "Task is already considered");
                    return;
                }
            }
            Delivery::Requeued => debug!(node_id = %node_id, "Running requeued task"),
        }

        info!(node_id = %node_id, kind = task.template.type_name(), "Attempting task");
        let execution = self.execute(task.template.clone()).await;

        if execution.result.has_phase() {
            info!(node_id = %node_id, phase = ?execution.result.phase, "Sending result");
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                sent = self.results.send(TaskResult {
                    node_id: node_id.clone(),
                    result: execution.result,
                }) => sent,
            };
            if sent.is_err() {
                debug!(node_id = %node_id, "Result queue closed");
                return;
            }
        }

        if !execution.requeue.is_zero() {
            self.schedule_requeue(
                QueuedTask {
                    delivery: Delivery::Requeued,
                    ..task
                },
                execution.requeue,
            );
        }
    }

    /// Execute in a separate task so a panicking strategy only fails its
    /// own node.
    async fn execute(&self, template: Template) -> Execution {
        let dispatcher = self.dispatcher.clone();
        match tokio::spawn(async move { dispatcher.dispatch(&template).await }).await {
            Ok(execution) => execution,
            Err(e) => {
                error!(error = %e, "Task execution aborted");
                Execution::done(NodeResult::failed(
                    ExecutionError::Panicked(e.to_string()).to_string(),
                ))
            }
        }
    }

    /// Put the task back on the queue after `delay`, once.
    fn schedule_requeue(&self, task: QueuedTask, delay: Duration) {
        info!(
            node_id = %task.node_id,
            requeue_ms = delay.as_millis() as u64,
            "Requeueing task"
        );
        let queue = self.requeue.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = async {
                    tokio::time::sleep(delay).await;
                    let _ = queue.send(task).await;
                } => {}
            }
        });
    }
}
