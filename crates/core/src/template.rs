//! Templates: the execution descriptor attached to each task.
//!
//! Only the HTTP and Plugin kinds are understood by the agent. Any other
//! template fields are carried through untouched so plugins receive the
//! template exactly as the task set holds it.

use serde::{Deserialize, Serialize};

/// Template kinds the agent does not execute, in the order they are reported.
const FOREIGN_KINDS: &[(&str, &str)] = &[
    ("container", "Container"),
    ("containerSet", "ContainerSet"),
    ("script", "Script"),
    ("resource", "Resource"),
    ("dag", "DAG"),
    ("steps", "Steps"),
    ("suspend", "Suspend"),
    ("data", "Data"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpTemplate>,

    /// Opaque plugin payload, e.g. `{"slack": {"text": "hi"}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<serde_json::Value>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Which strategy a template asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateKind<'a> {
    Http(&'a HttpTemplate),
    Plugin(&'a serde_json::Value),
}

impl Template {
    /// The executable kind of this template, if the agent understands it.
    ///
    /// HTTP takes precedence when a malformed template carries both.
    pub fn kind(&self) -> Option<TemplateKind<'_>> {
        if let Some(http) = &self.http {
            return Some(TemplateKind::Http(http));
        }
        self.plugin.as_ref().map(TemplateKind::Plugin)
    }

    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            Some(TemplateKind::Http(_)) => "HTTP",
            Some(TemplateKind::Plugin(_)) => "Plugin",
            None => FOREIGN_KINDS
                .iter()
                .find(|(key, _)| self.extra.contains_key(*key))
                .map(|(_, name)| *name)
                .unwrap_or("Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTemplate {
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HttpHeader>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

fn default_method() -> String {
    "GET".into()
}

impl HttpTemplate {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: vec![],
            timeout_seconds: None,
            body: String::new(),
        }
    }
}

/// A request header, either literal or sourced from a secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeader {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<HttpHeaderSource>,
}

impl HttpHeader {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            value_from: None,
        }
    }

    pub fn from_secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            value_from: Some(HttpHeaderSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret.into(),
                    key: key.into(),
                }),
            }),
        }
    }

    /// The secret this header's value must be read from, if any.
    pub fn secret_ref(&self) -> Option<&SecretKeySelector> {
        self.value_from.as_ref()?.secret_key_ref.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}
