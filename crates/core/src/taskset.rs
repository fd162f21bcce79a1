//! The remote task-set resource and the events observed on it.

use crate::node::NodeResult;
use crate::template::Template;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Label that marks a task set as logically complete when set to `"true"`.
pub const LABEL_KEY_COMPLETED: &str = "workflows.argoproj.io/completed";

/// The set of tasks assigned to one agent, plus the results reported so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTaskSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: TaskSetSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskSetStatus>,
}

impl WorkflowTaskSet {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: Some("argoproj.io/v1alpha1".into()),
            kind: Some("WorkflowTaskSet".into()),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..ObjectMeta::default()
            },
            ..Self::default()
        }
    }

    /// Add a task, builder style.
    pub fn with_task(mut self, node_id: impl Into<String>, template: Template) -> Self {
        self.spec.tasks.insert(node_id.into(), template);
        self
    }

    /// Whether the owning workflow has finished and the agent should stop.
    pub fn is_completed(&self) -> bool {
        self.metadata
            .labels
            .get(LABEL_KEY_COMPLETED)
            .is_some_and(|v| v == "true")
    }

    /// Results recorded in the status sub-object.
    pub fn node_results(&self) -> Option<&BTreeMap<String, NodeResult>> {
        self.status.as_ref().map(|s| &s.nodes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSetSpec {
    #[serde(default)]
    pub tasks: BTreeMap<String, Template>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSetStatus {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeResult>,
}

/// The status object an API server returns on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub code: u16,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,
}

/// One change notification for the watched task set.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(WorkflowTaskSet),
    Modified(WorkflowTaskSet),
    Deleted,
    /// The server sent a status object instead of a task set
    Error(ApiStatus),
}

impl WatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "ADDED",
            WatchEvent::Modified(_) => "MODIFIED",
            WatchEvent::Deleted => "DELETED",
            WatchEvent::Error(_) => "ERROR",
        }
    }
}
