//! Plugin strategy: an ordered chain of executor plugins.
//!
//! Each plugin is asked in registration order. The first one that returns a
//! node result wins and later plugins are not consulted. A plugin that
//! declines is skipped; a plugin that fails hard fails the task.

use crate::{Execution, ExecutionStrategy};
use async_trait::async_trait;
use flowhand_core::error::ExecutionError;
use flowhand_core::plugin::{ExecuteTemplateArgs, TemplateExecutor};
use flowhand_core::template::Template;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PluginStrategy {
    workflow_name: String,
    plugins: Vec<Arc<dyn TemplateExecutor>>,
}

impl PluginStrategy {
    /// Create an empty chain for templates of `workflow_name`.
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            plugins: Vec::new(),
        }
    }

    /// Append a plugin to the chain.
    pub fn add(mut self, plugin: Arc<dyn TemplateExecutor>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Append several plugins, keeping their order.
    pub fn extend(mut self, plugins: impl IntoIterator<Item = Arc<dyn TemplateExecutor>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Number of plugins in the chain.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[async_trait]
impl ExecutionStrategy for PluginStrategy {
    fn name(&self) -> &str {
        "plugin"
    }

    async fn execute(&self, template: &Template) -> Result<Execution, ExecutionError> {
        let args = ExecuteTemplateArgs::new(self.workflow_name.clone(), template.clone());

        for (i, plugin) in self.plugins.iter().enumerate() {
            debug!(
                plugin = plugin.name(),
                position = i + 1,
                total = self.plugins.len(),
                "Offering template to plugin"
            );

            let reply = plugin.execute_template(&args).await.map_err(|e| {
                warn!(plugin = plugin.name(), error = %e, "Plugin failed");
                ExecutionError::from(e)
            })?;

            if let Some(node) = reply.node.clone() {
                info!(
                    plugin = plugin.name(),
                    phase = ?node.phase,
                    requeue_ms = reply.requeue().as_millis() as u64,
                    "Plugin executed template"
                );
                return Ok(Execution {
                    result: node,
                    requeue: reply.requeue(),
                });
            }
        }

        Err(ExecutionError::NoPluginExecuted)
    }
}
