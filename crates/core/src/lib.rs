//! # flowhand core
//!
//! Domain types, traits, and error definitions for the flowhand task agent.
//! This crate has **no framework dependencies**: it defines the model that the
//! executor, store, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`TaskSetStore`]: the remote task-set resource (watch + merge patch)
//! - [`SecretStore`]: secret lookup for HTTP headers
//! - [`TemplateExecutor`]: an external plugin executor
//!
//! Implementations live in their respective crates, so tests can swap in
//! mocks and the agent never depends on a particular backing store.

pub mod duration;
pub mod error;
pub mod node;
pub mod plugin;
pub mod store;
pub mod taskset;
pub mod template;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ExecutionError, PluginError, Result, StoreError};
pub use node::{NodePhase, NodeResult, Outputs, Parameter};
pub use plugin::{ExecuteTemplateArgs, ExecuteTemplateReply, TemplateExecutor, WorkflowRef};
pub use store::{SecretStore, TaskSetStore, WatchStream};
pub use taskset::{
    ApiStatus, LABEL_KEY_COMPLETED, ObjectMeta, TaskSetSpec, TaskSetStatus, WatchEvent,
    WorkflowTaskSet,
};
pub use template::{
    HttpHeader, HttpHeaderSource, HttpTemplate, SecretKeySelector, Template, TemplateKind,
};

/// Stable identity of a task within its owning task set.
pub type NodeId = String;
