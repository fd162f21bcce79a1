//! `flowhand agent`: Run the task agent.

use anyhow::bail;
use flowhand_agent::Agent;
use flowhand_config::AgentConfig;
use flowhand_store::KubeStore;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub workflow: Option<String>,
    pub namespace: Option<String>,
    pub workers: Option<usize>,
}

impl Overrides {
    fn apply(self, config: &mut AgentConfig) {
        if let Some(workflow) = self.workflow {
            config.workflow_name = workflow;
        }
        if let Some(namespace) = self.namespace {
            config.namespace = namespace;
        }
        if let Some(workers) = self.workers {
            config.task_workers = workers;
        }
    }
}

/// File, then environment, then flags; validated once all three are in.
fn resolve(config_path: Option<&Path>, overrides: Overrides) -> anyhow::Result<AgentConfig> {
    let mut config = super::read_config(config_path)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

pub async fn run(config_path: Option<&Path>, overrides: Overrides) -> anyhow::Result<()> {
    let config = resolve(config_path, overrides)?;

    if config.workflow_name.is_empty() {
        bail!("no workflow name: pass --workflow or set FLOWHAND_WORKFLOW_NAME");
    }

    let store = Arc::new(KubeStore::from_config(&config.kube, &config.namespace)?);
    let agent = Agent::from_config(&config, store.clone(), store);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, stopping agent");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    agent.run(cancel).await?;
    Ok(())
}
