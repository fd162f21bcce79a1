//! Store traits: the abstraction over the remote, eventually-consistent
//! task-set resource and the secrets it references.
//!
//! The task set behaves like a distributed work queue with a merge-patch
//! update primitive. Any backing store that can stream change events for one
//! named resource and apply partial updates to it can drive the agent.

use crate::error::StoreError;
use crate::taskset::WatchEvent;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// A stream of change notifications for one task set.
///
/// The stream ending without a `Deleted` event is not terminal; callers are
/// expected to subscribe again. An `Err` item means the payload could not be
/// understood and is fatal.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, StoreError>>;

/// The remote task-set resource.
#[async_trait]
pub trait TaskSetStore: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Subscribe to changes of exactly one task set, identified by name.
    async fn watch(&self, task_set: &str) -> Result<WatchStream, StoreError>;

    /// Apply a JSON merge patch to the named task set.
    ///
    /// Conflicting concurrent writes are reported as transient errors
    /// (see [`StoreError::is_transient`]).
    async fn merge_patch(
        &self,
        task_set: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Secret lookup used to resolve HTTP header values.
///
/// Implementations must not cache: values are read on every call so that
/// rotated secrets take effect immediately.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Vec<u8>, StoreError>;
}
