//! The agent orchestrator.

use crate::batcher::ResultBatcher;
use crate::intake::Intake;
use crate::pool::WorkerPool;
use flowhand_config::AgentConfig;
use flowhand_core::store::{SecretStore, TaskSetStore};
use flowhand_executor::{HttpStrategy, PluginStrategy, TemplateDispatcher, plugins_from_config};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Default size of the worker pool.
pub const DEFAULT_TASK_WORKERS: usize = 16;

/// Executes the tasks of one task set and reports their results.
pub struct Agent {
    store: Arc<dyn TaskSetStore>,
    dispatcher: TemplateDispatcher,
    task_set: String,
    workers: usize,
}

impl Agent {
    pub fn new(
        store: Arc<dyn TaskSetStore>,
        dispatcher: TemplateDispatcher,
        task_set: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            task_set: task_set.into(),
            workers: DEFAULT_TASK_WORKERS,
        }
    }

    /// Wire up the HTTP strategy and the configured plugin chain.
    ///
    /// The task set is named after the workflow.
    pub fn from_config(
        config: &AgentConfig,
        store: Arc<dyn TaskSetStore>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        let http = HttpStrategy::new(secrets, &config.namespace);
        let plugins =
            PluginStrategy::new(&config.workflow_name).extend(plugins_from_config(&config.plugins));
        let dispatcher = TemplateDispatcher::new(Arc::new(http), Arc::new(plugins));
        Self::new(store, dispatcher, &config.workflow_name).with_workers(config.task_workers)
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run until the task set is deleted or completed, a fatal error occurs,
    /// or `cancel` fires.
    ///
    /// Workers and the batcher are stopped, not drained: results that were
    /// not yet written are lost.
    pub async fn run(self, cancel: CancellationToken) -> flowhand_core::Result<()> {
        info!(
            task_set = %self.task_set,
            store = self.store.name(),
            workers = self.workers,
            "Starting agent"
        );

        let cancel = cancel.child_token();
        let (task_tx, task_rx) = mpsc::channel(1);
        let (result_tx, result_rx) = mpsc::channel(1);

        let batcher = ResultBatcher::new(self.store.clone(), self.task_set.clone());
        let batcher = tokio::spawn(batcher.run(result_rx, cancel.clone()));

        let workers = WorkerPool::new(self.dispatcher, self.workers).spawn(
            task_rx,
            task_tx.clone(),
            result_tx,
            cancel.clone(),
        );

        let intake = Intake::new(self.store, self.task_set.clone(), task_tx);
        let outcome = intake.run(&cancel).await;

        cancel.cancel();
        batcher.abort();
        drop(workers);

        match &outcome {
            Ok(()) => info!(task_set = %self.task_set, "Stopped agent"),
            Err(e) => error!(task_set = %self.task_set, error = %e, "Stopped agent"),
        }
        outcome.map_err(Into::into)
    }
}
