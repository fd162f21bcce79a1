//! Template execution strategies for flowhand.
//!
//! A strategy executes one template and reports a node result plus an
//! optional requeue delay. Two strategies ship with the agent:
//! - [`HttpStrategy`]: calls the endpoint described by an HTTP template
//! - [`PluginStrategy`]: hands the template to an ordered chain of
//!   executor plugins ([`HttpPluginExecutor`] talks to plugin sidecars)
//!
//! [`TemplateDispatcher`] picks the strategy for a template and turns every
//! strategy error into a `Failed` result, so callers never see an error.

pub mod dispatch;
pub mod http;
pub mod plugin;
pub mod sidecar;

#[cfg(test)]
mod test_helpers;

use async_trait::async_trait;
use flowhand_core::error::ExecutionError;
use flowhand_core::node::NodeResult;
use flowhand_core::template::Template;
use std::time::Duration;

pub use dispatch::TemplateDispatcher;
pub use http::HttpStrategy;
pub use plugin::PluginStrategy;
pub use sidecar::{HttpPluginExecutor, plugins_from_config};

/// The outcome of executing a template once.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub result: NodeResult,

    /// Run the same template again after this delay; zero means never
    pub requeue: Duration,
}

impl Execution {
    /// A finished execution with no requeue.
    pub fn done(result: NodeResult) -> Self {
        Self {
            result,
            requeue: Duration::ZERO,
        }
    }
}

/// A handler for one template kind.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Strategy name, for logs.
    fn name(&self) -> &str;

    async fn execute(&self, template: &Template) -> Result<Execution, ExecutionError>;
}
