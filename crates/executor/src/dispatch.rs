//! Template dispatch: picks the strategy for a template's kind.

use crate::{Execution, ExecutionStrategy};
use flowhand_core::error::ExecutionError;
use flowhand_core::node::NodeResult;
use flowhand_core::template::{Template, TemplateKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes HTTP templates to the HTTP strategy and plugin templates to the
/// plugin chain. Every failure comes back as a `Failed` result with no
/// requeue.
#[derive(Clone)]
pub struct TemplateDispatcher {
    http: Arc<dyn ExecutionStrategy>,
    plugin: Arc<dyn ExecutionStrategy>,
}

impl TemplateDispatcher {
    pub fn new(http: Arc<dyn ExecutionStrategy>, plugin: Arc<dyn ExecutionStrategy>) -> Self {
        Self { http, plugin }
    }

    /// Execute `template` once.
    pub async fn dispatch(&self, template: &Template) -> Execution {
        match self.try_dispatch(template).await {
            Ok(execution) => execution,
            Err(e) => {
                warn!(template = %template.name, error = %e, "Task failed");
                Execution::done(NodeResult::failed(e.to_string()))
            }
        }
    }

    async fn try_dispatch(&self, template: &Template) -> Result<Execution, ExecutionError> {
        let strategy = match template.kind() {
            Some(TemplateKind::Http(_)) => &self.http,
            Some(TemplateKind::Plugin(_)) => &self.plugin,
            None => {
                return Err(ExecutionError::UnknownTaskType(
                    template.type_name().to_string(),
                ));
            }
        };
        debug!(template = %template.name, strategy = strategy.name(), "Dispatching task");
        strategy.execute(template).await
    }
}
