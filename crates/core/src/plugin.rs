//! Plugin executor trait: the abstraction over external template executors.
//!
//! Plugins are consulted in registration order. Each one either declines a
//! template (no node, no error), handles it (a node result, possibly with a
//! requeue delay so it is polled again later), or fails hard.

use crate::error::PluginError;
use crate::node::NodeResult;
use crate::taskset::ObjectMeta;
use crate::template::Template;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The request envelope sent to every plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteTemplateArgs {
    pub workflow: WorkflowRef,
    pub template: Template,
}

impl ExecuteTemplateArgs {
    pub fn new(workflow_name: impl Into<String>, template: Template) -> Self {
        Self {
            workflow: WorkflowRef {
                metadata: ObjectMeta {
                    name: workflow_name.into(),
                    ..ObjectMeta::default()
                },
            },
            template,
        }
    }
}

/// Identity of the workflow a template belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub metadata: ObjectMeta,
}

/// A plugin's answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteTemplateReply {
    /// `None` means the plugin does not handle this template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeResult>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::duration::serde_opt"
    )]
    pub requeue: Option<Duration>,
}

impl ExecuteTemplateReply {
    /// The plugin does not handle this template.
    pub fn decline() -> Self {
        Self::default()
    }

    pub fn handled(node: NodeResult) -> Self {
        Self {
            node: Some(node),
            requeue: None,
        }
    }

    /// Ask to be consulted again after `delay`.
    pub fn with_requeue(mut self, delay: Duration) -> Self {
        self.requeue = Some(delay);
        self
    }

    /// Requeue delay, zero when none was requested.
    pub fn requeue(&self) -> Duration {
        self.requeue.unwrap_or(Duration::ZERO)
    }
}

/// An external executor that may handle plugin templates.
#[async_trait]
pub trait TemplateExecutor: Send + Sync {
    /// Plugin name, for logs and error messages.
    fn name(&self) -> &str;

    async fn execute_template(
        &self,
        args: &ExecuteTemplateArgs,
    ) -> Result<ExecuteTemplateReply, PluginError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodePhase;

    #[test]
    fn args_serialize_with_workflow_name() {
        let args = ExecuteTemplateArgs::new(
            "hello-wf",
            Template {
                name: "greet".into(),
                plugin: Some(serde_json::json!({"hello": {}})),
                ..Template::default()
            },
        );
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["workflow"]["metadata"]["name"], "hello-wf");
        assert_eq!(json["template"]["plugin"]["hello"], serde_json::json!({}));
    }

    #[test]
    fn reply_parses_requeue_duration() {
        let reply: ExecuteTemplateReply = serde_json::from_value(serde_json::json!({
            "node": {"phase": "Running", "message": "waiting"},
            "requeue": "1m30s"
        }))
        .unwrap();
        assert_eq!(reply.node.unwrap().phase, Some(NodePhase::Running));
        assert_eq!(reply.requeue.unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn empty_reply_is_a_decline() {
        let reply: ExecuteTemplateReply = serde_json::from_str("{}").unwrap();
        assert!(reply.node.is_none());
        assert_eq!(reply.requeue(), Duration::ZERO);
        assert_eq!(reply, ExecuteTemplateReply::decline());
    }

    #[test]
    fn builder_sets_requeue() {
        let reply = ExecuteTemplateReply::handled(NodeResult::default())
            .with_requeue(Duration::from_secs(5));
        assert_eq!(reply.requeue(), Duration::from_secs(5));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["requeue"], "5s");
    }
}
