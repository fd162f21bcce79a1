//! Configuration loading, validation, and management for flowhand.
//!
//! Loads configuration from `/etc/flowhand/agent.toml` (or the path in
//! `FLOWHAND_CONFIG`) with environment variable overrides. Settings are
//! validated after every override has been applied.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Path of the config file, if not the default.
pub const ENV_CONFIG_PATH: &str = "FLOWHAND_CONFIG";
/// Name of the workflow (and task set) this agent serves.
pub const ENV_WORKFLOW_NAME: &str = "FLOWHAND_WORKFLOW_NAME";
/// Namespace of the task set.
pub const ENV_NAMESPACE: &str = "FLOWHAND_NAMESPACE";
/// Number of concurrent task workers.
pub const ENV_TASK_WORKERS: &str = "FLOWHAND_AGENT_TASK_WORKERS";

const DEFAULT_CONFIG_PATH: &str = "/etc/flowhand/agent.toml";
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// The root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Workflow whose task set this agent watches
    #[serde(default)]
    pub workflow_name: String,

    /// Namespace of the task set and of referenced secrets
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Size of the worker pool
    #[serde(default = "default_task_workers")]
    pub task_workers: usize,

    /// Kubernetes API access
    #[serde(default)]
    pub kube: KubeConfig,

    /// Executor plugins, consulted in the order listed
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

fn default_namespace() -> String {
    "default".into()
}
fn default_task_workers() -> usize {
    16
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token file, re-read on every request so rotation is picked up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,

    /// PEM bundle used to verify the API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://kubernetes.default.svc".into()
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_path: Some(Path::new(SERVICE_ACCOUNT_DIR).join("token")),
            ca_path: Some(Path::new(SERVICE_ACCOUNT_DIR).join("ca.crt")),
        }
    }
}

/// An executor plugin reachable over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub name: String,

    /// Base URL, e.g. `http://localhost:7522`
    pub address: String,

    /// File holding the bearer token the plugin expects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,

    #[serde(default = "default_plugin_timeout")]
    pub timeout_secs: u64,
}

fn default_plugin_timeout() -> u64 {
    30
}

impl AgentConfig {
    /// Load configuration from a specific file path.
    ///
    /// The result is not validated: environment and command-line overrides
    /// may still replace values, so call [`AgentConfig::validate`] once they
    /// have been applied.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    /// The config file location.
    pub fn config_path() -> PathBuf {
        std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Environment variables:
    /// - `FLOWHAND_WORKFLOW_NAME`
    /// - `FLOWHAND_NAMESPACE`
    /// - `FLOWHAND_AGENT_TASK_WORKERS`
    /// - `KUBERNETES_SERVICE_HOST` / `KUBERNETES_SERVICE_PORT`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_WORKFLOW_NAME).filter(|s| !s.is_empty()) {
            self.workflow_name = name;
        }

        if let Some(namespace) = lookup(ENV_NAMESPACE).filter(|s| !s.is_empty()) {
            self.namespace = namespace;
        }

        if let Some(raw) = lookup(ENV_TASK_WORKERS) {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.task_workers = n,
                Err(_) => tracing::warn!(
                    value = %raw,
                    fallback = self.task_workers,
                    "Ignoring invalid {ENV_TASK_WORKERS}"
                ),
            }
        }

        if let Some(host) = lookup("KUBERNETES_SERVICE_HOST").filter(|s| !s.is_empty()) {
            let port = lookup("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".into());
            let host = if host.contains(':') {
                format!("[{host}]")
            } else {
                host
            };
            self.kube.api_url = format!("https://{host}:{port}");
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_workers == 0 {
            return Err(ConfigError::ValidationError(
                "task_workers must be at least 1".into(),
            ));
        }

        if !is_http_url(&self.kube.api_url) {
            return Err(ConfigError::ValidationError(format!(
                "kube.api_url must be an http(s) URL, got {:?}",
                self.kube.api_url
            )));
        }

        let mut seen = HashSet::new();
        for plugin in &self.plugins {
            if !seen.insert(plugin.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate plugin name {:?}",
                    plugin.name
                )));
            }
            if !is_http_url(&plugin.address) {
                return Err(ConfigError::ValidationError(format!(
                    "plugin {:?} address must be an http(s) URL, got {:?}",
                    plugin.name, plugin.address
                )));
            }
            if plugin.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "plugin {:?} timeout_secs must be > 0",
                    plugin.name
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workflow_name: String::new(),
            namespace: default_namespace(),
            task_workers: default_task_workers(),
            kube: KubeConfig::default(),
            plugins: vec![],
        }
    }
}

fn is_http_url(s: &str) -> bool {
    (s.starts_with("http://") && s.len() > "http://".len())
        || (s.starts_with("https://") && s.len() > "https://".len())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
