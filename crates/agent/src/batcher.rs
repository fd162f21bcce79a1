//! Result batcher: the only writer of `status.nodes`.
//!
//! Results are buffered by node id and written with one merge patch per
//! tick. A transient write failure leaves the buffer as it was for the next
//! tick. A permanent one rewrites every buffered result into an `Error`
//! result explaining why, and those are written instead.

use crate::pool::TaskResult;
use flowhand_core::NodeId;
use flowhand_core::node::NodeResult;
use flowhand_core::store::TaskSetStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often buffered results are written.
pub const PATCH_INTERVAL: Duration = Duration::from_secs(10);

const PATCH_FAILED_PREFIX: &str =
    "HTTP request completed successfully but an error occurred when patching its result";

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing buffered; no write was made
    Empty,
    /// This many results were written and the buffer cleared
    Patched(usize),
    /// Transient failure; the buffer is unchanged
    Retrying,
    /// Permanent failure; buffered results were replaced by errors
    Downgraded,
}

pub struct ResultBatcher {
    store: Arc<dyn TaskSetStore>,
    task_set: String,
    pending: BTreeMap<NodeId, NodeResult>,
}

impl ResultBatcher {
    pub fn new(store: Arc<dyn TaskSetStore>, task_set: impl Into<String>) -> Self {
        Self {
            store,
            task_set: task_set.into(),
            pending: BTreeMap::new(),
        }
    }

    /// Buffer a result. A later result for the same node replaces it.
    pub fn record(&mut self, node_id: NodeId, result: NodeResult) {
        debug!(node_id = %node_id, phase = ?result.phase, "Buffered result");
        self.pending.insert(node_id, result);
    }

    pub fn pending(&self) -> &BTreeMap<NodeId, NodeResult> {
        &self.pending
    }

    /// Write everything buffered in one merge patch.
    pub async fn flush(&mut self) -> FlushOutcome {
        if self.pending.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = self.pending.len();
        let patch = serde_json::json!({ "status": { "nodes": &self.pending } });
        info!(task_set = %self.task_set, nodes = count, "Processing patch");

        match self.store.merge_patch(&self.task_set, &patch).await {
            Ok(()) => {
                info!(task_set = %self.task_set, nodes = count, "Patched task set");
                self.pending.clear();
                FlushOutcome::Patched(count)
            }
            Err(e) if e.is_transient() => {
                warn!(
                    task_set = %self.task_set,
                    error = %e,
                    is_transient = true,
                    "TaskSet patch failed"
                );
                FlushOutcome::Retrying
            }
            Err(e) => {
                error!(
                    task_set = %self.task_set,
                    error = %e,
                    is_transient = false,
                    "TaskSet patch failed"
                );
                let message = format!("{PATCH_FAILED_PREFIX}: {e}");
                for result in self.pending.values_mut() {
                    *result = NodeResult::error(message.clone());
                }
                FlushOutcome::Downgraded
            }
        }
    }

    /// Collect results and flush every [`PATCH_INTERVAL`] until `cancel`
    /// fires. Anything still buffered at that point is dropped.
    pub async fn run(mut self, mut results: mpsc::Receiver<TaskResult>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + PATCH_INTERVAL, PATCH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = results.recv() => match received {
                    Some(TaskResult { node_id, result }) => self.record(node_id, result),
                    None => {
                        self.flush().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }

        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "Batcher stopped with unwritten results");
        }
    }
}
