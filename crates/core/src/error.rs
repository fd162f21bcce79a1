//! Error types for the flowhand domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; only [`AgentError`] is ever
//! allowed to end an agent run. Everything below it is task-scoped.

use thiserror::Error;

/// The top-level error type for all flowhand operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Agent lifecycle errors (fatal) ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Remote store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Task execution errors ---
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the remote task-set store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("API request failed: {message} (status: {status_code}, reason: {reason})")]
    Api {
        status_code: u16,
        reason: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed watch event: {0}")]
    MalformedEvent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// An optimistic-concurrency conflict (HTTP 409).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Api {
            status_code: 409,
            reason: "Conflict".into(),
            message: message.into(),
        }
    }

    /// A rejected request that will not succeed if retried unchanged.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Api {
            status_code: 422,
            reason: "Invalid".into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same request later may succeed.
    ///
    /// Conflicts, throttling, server timeouts, unavailable servers, exhausted
    /// quotas and connectivity problems are transient. Everything else is
    /// assumed to be caused by the request itself.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Api {
                status_code,
                reason,
                message,
            } => match *status_code {
                409 | 429 | 503 | 504 => true,
                500 => reason == "ServerTimeout",
                403 => message.contains("exceeded quota"),
                _ => false,
            },
            StoreError::Network(_) | StoreError::Timeout(_) => true,
            StoreError::MalformedEvent(_)
            | StoreError::NotFound(_)
            | StoreError::Serialization(_) => false,
        }
    }
}

/// Failures executing a single task. These never end the agent run; the
/// worker pool turns them into a `Failed` node result.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("no plugin executed the template")]
    NoPluginExecuted,

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("{0}")]
    Http(String),

    #[error("failed to get secret {name}/{key}: {reason}")]
    Secret {
        name: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("task execution panicked: {0}")]
    Panicked(String),
}

/// Failures reported by an external plugin executor.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    #[error("plugin {plugin} failed: {reason}")]
    Failed { plugin: String, reason: String },

    #[error("plugin {plugin} returned status {status_code}: {body}")]
    Status {
        plugin: String,
        status_code: u16,
        body: String,
    },

    #[error("plugin {plugin} timed out after {timeout_secs}s")]
    Timeout { plugin: String, timeout_secs: u64 },

    #[error("plugin {plugin} returned an invalid reply: {reason}")]
    InvalidReply { plugin: String, reason: String },
}

/// Fatal errors that terminate the agent run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to watch task set {name}: {source}")]
    Subscribe { name: String, source: StoreError },

    #[error("malformed task set event ({event_type}): {message}")]
    MalformedEvent { event_type: String, message: String },
}
