//! Task-set store backends for flowhand.
//!
//! - [`KubeStore`] talks to a Kubernetes API server over REST
//! - [`InMemoryStore`] keeps one task set in memory, for tests and dry runs

pub mod in_memory;
pub mod kube;
pub mod merge;

pub use in_memory::InMemoryStore;
pub use kube::KubeStore;
