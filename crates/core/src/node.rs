//! Node results: what a task reports back to the task set.

use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle phase of a node.
///
/// An absent phase means "nothing to report yet"; such results are never
/// forwarded to the batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
}

impl NodePhase {
    /// Whether the node has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodePhase::Succeeded | NodePhase::Failed | NodePhase::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodePhase::Pending => "Pending",
            NodePhase::Running => "Running",
            NodePhase::Succeeded => "Succeeded",
            NodePhase::Failed => "Failed",
            NodePhase::Error => "Error",
        }
    }
}

impl std::fmt::Display for NodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of executing one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "phase_or_empty"
    )]
    pub phase: Option<NodePhase>,

    /// Human-readable detail, usually set on failure
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,

    /// Free-form progress indicator reported by plugins (e.g. "1/3")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub progress: String,
}

impl NodeResult {
    pub fn succeeded(outputs: Option<Outputs>) -> Self {
        Self {
            phase: Some(NodePhase::Succeeded),
            outputs,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            phase: Some(NodePhase::Failed),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            phase: Some(NodePhase::Error),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Whether this result carries a phase worth reporting.
    pub fn has_phase(&self) -> bool {
        self.phase.is_some()
    }
}

/// Outputs produced by a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Outputs {
    /// Look up an output parameter value by name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }
}

/// A named output value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// The wire format uses `""` for "no phase".
fn phase_or_empty<'de, D>(deserializer: D) -> Result<Option<NodePhase>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => NodePhase::deserialize(s.into_deserializer()).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_phase_deserializes_as_none() {
        let result: NodeResult = serde_json::from_str(r#"{"phase": ""}"#).unwrap();
        assert_eq!(result.phase, None);
        assert!(!result.has_phase());

        let result: NodeResult = serde_json::from_str("{}").unwrap();
        assert_eq!(result.phase, None);
    }

    #[test]
    fn phase_round_trips_through_wire_names() {
        let result: NodeResult =
            serde_json::from_str(r#"{"phase": "Running", "progress": "1/2"}"#).unwrap();
        assert_eq!(result.phase, Some(NodePhase::Running));
        assert_eq!(result.progress, "1/2");

        let json = serde_json::to_value(NodeResult::failed("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"phase": "Failed", "message": "boom"}));
    }

    #[test]
    fn unknown_phase_is_rejected() {
        assert!(serde_json::from_str::<NodeResult>(r#"{"phase": "Exploded"}"#).is_err());
    }

    #[test]
    fn output_parameter_lookup() {
        let outputs = Outputs {
            parameters: vec![Parameter::new("result", "{\"ok\":true}")],
        };
        assert_eq!(outputs.parameter("result"), Some("{\"ok\":true}"));
        assert_eq!(outputs.parameter("missing"), None);
    }

    #[test]
    fn terminal_phases() {
        assert!(NodePhase::Succeeded.is_terminal());
        assert!(NodePhase::Error.is_terminal());
        assert!(!NodePhase::Running.is_terminal());
        assert!(!NodePhase::Pending.is_terminal());
    }
}
