//! In-memory store: holds a single task set and its secrets.
//!
//! Useful for tests and for running the agent without a cluster. Mutations
//! made through [`InMemoryStore::apply`], [`InMemoryStore::delete`] and
//! [`InMemoryStore::mark_completed`] are delivered to every open watch, as
//! are the status changes written by merge patches.

use crate::merge;
use async_trait::async_trait;
use flowhand_core::error::StoreError;
use flowhand_core::store::{SecretStore, TaskSetStore, WatchStream};
use flowhand_core::taskset::{LABEL_KEY_COMPLETED, WatchEvent, WorkflowTaskSet};
use futures::StreamExt;
use futures::channel::mpsc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type EventSender = mpsc::UnboundedSender<Result<WatchEvent, StoreError>>;

#[derive(Default)]
struct State {
    task_set: Option<WorkflowTaskSet>,
    watchers: Vec<(String, EventSender)>,
    subscriptions: usize,
    watch_failures: VecDeque<StoreError>,
    patches: Vec<serde_json::Value>,
    patch_attempts: usize,
    patch_failures: VecDeque<StoreError>,
    secrets: HashMap<(String, String, String), Vec<u8>>,
}

impl State {
    fn broadcast(&mut self, name: &str, event: Result<WatchEvent, StoreError>) {
        self.watchers.retain(|(watched, tx)| {
            watched != name || tx.unbounded_send(event.clone()).is_ok()
        });
    }
}

/// A task-set store that keeps everything in memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the task set, emitting ADDED or MODIFIED.
    pub async fn apply(&self, task_set: WorkflowTaskSet) {
        let mut state = self.state.lock().await;
        let name = task_set.metadata.name.clone();
        let event = match &state.task_set {
            Some(existing) if existing.metadata.name == name => {
                WatchEvent::Modified(task_set.clone())
            }
            _ => WatchEvent::Added(task_set.clone()),
        };
        state.task_set = Some(task_set);
        state.broadcast(&name, Ok(event));
    }

    /// Remove the task set, emitting DELETED.
    pub async fn delete(&self) {
        let mut state = self.state.lock().await;
        if let Some(ts) = state.task_set.take() {
            state.broadcast(&ts.metadata.name, Ok(WatchEvent::Deleted));
        }
    }

    /// Set the completion label, emitting MODIFIED.
    pub async fn mark_completed(&self) {
        let Some(mut ts) = self.task_set().await else {
            return;
        };
        ts.metadata
            .labels
            .insert(LABEL_KEY_COMPLETED.into(), "true".into());
        self.apply(ts).await;
    }

    /// Send a raw event to watchers of `name`.
    pub async fn emit(&self, name: &str, event: Result<WatchEvent, StoreError>) {
        self.state.lock().await.broadcast(name, event);
    }

    /// End every open watch without a terminal event.
    pub async fn close_watches(&self) {
        self.state.lock().await.watchers.clear();
    }

    /// Make the next `watch` call fail with `err`.
    pub async fn fail_next_watch(&self, err: StoreError) {
        self.state.lock().await.watch_failures.push_back(err);
    }

    /// Make the next `merge_patch` call fail with `err`.
    pub async fn fail_next_patch(&self, err: StoreError) {
        self.state.lock().await.patch_failures.push_back(err);
    }

    pub async fn set_secret(&self, namespace: &str, name: &str, key: &str, value: &[u8]) {
        self.state
            .lock()
            .await
            .secrets
            .insert((namespace.into(), name.into(), key.into()), value.to_vec());
    }

    /// Current task set, status included.
    pub async fn task_set(&self) -> Option<WorkflowTaskSet> {
        self.state.lock().await.task_set.clone()
    }

    /// Patches applied successfully, oldest first.
    pub async fn patches(&self) -> Vec<serde_json::Value> {
        self.state.lock().await.patches.clone()
    }

    /// Every `merge_patch` call, failed ones included.
    pub async fn patch_attempts(&self) -> usize {
        self.state.lock().await.patch_attempts
    }

    /// Successful `watch` calls so far.
    pub async fn subscriptions(&self) -> usize {
        self.state.lock().await.subscriptions
    }
}

#[async_trait]
impl TaskSetStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn watch(&self, task_set: &str) -> Result<WatchStream, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.watch_failures.pop_front() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded();
        if let Some(ts) = state.task_set.as_ref().filter(|ts| ts.metadata.name == task_set) {
            // A fresh watch starts with the current object, like a list+watch
            let _ = tx.unbounded_send(Ok(WatchEvent::Added(ts.clone())));
        }
        state.watchers.push((task_set.to_string(), tx));
        state.subscriptions += 1;
        debug!(task_set, subscriptions = state.subscriptions, "In-memory watch opened");

        Ok(rx.boxed())
    }

    async fn merge_patch(
        &self,
        task_set: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.patch_attempts += 1;
        if let Some(err) = state.patch_failures.pop_front() {
            return Err(err);
        }

        let current = state
            .task_set
            .as_ref()
            .filter(|ts| ts.metadata.name == task_set)
            .ok_or_else(|| StoreError::NotFound(format!("task set {task_set}")))?;

        let mut doc = serde_json::to_value(current)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        merge::merge_patch(&mut doc, patch);
        let updated: WorkflowTaskSet = serde_json::from_value(doc)
            .map_err(|e| StoreError::invalid(e.to_string()))?;

        state.patches.push(patch.clone());
        state.task_set = Some(updated.clone());
        state.broadcast(task_set, Ok(WatchEvent::Modified(updated)));
        Ok(())
    }
}

#[async_trait]
impl SecretStore for InMemoryStore {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Vec<u8>, StoreError> {
        self.state
            .lock()
            .await
            .secrets
            .get(&(namespace.to_string(), name.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("secret {namespace}/{name} key {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowhand_core::node::NodePhase;
    use flowhand_core::template::{HttpTemplate, Template};

    fn task_set() -> WorkflowTaskSet {
        WorkflowTaskSet::new("wf", "argo").with_task(
            "n1",
            Template {
                name: "call".into(),
                http: Some(HttpTemplate::new("GET", "http://example.invalid")),
                ..Template::default()
            },
        )
    }

    #[tokio::test]
    async fn watch_replays_current_object_then_follows_changes() {
        let store = InMemoryStore::new();
        store.apply(task_set()).await;

        let mut events = store.watch("wf").await.unwrap();
        assert!(matches!(events.next().await, Some(Ok(WatchEvent::Added(_)))));

        store.mark_completed().await;
        match events.next().await {
            Some(Ok(WatchEvent::Modified(ts))) => assert!(ts.is_completed()),
            other => panic!("unexpected event: {other:?}"),
        }

        store.delete().await;
        assert!(matches!(events.next().await, Some(Ok(WatchEvent::Deleted))));
    }

    #[tokio::test]
    async fn other_task_sets_are_not_delivered() {
        let store = InMemoryStore::new();
        let mut events = store.watch("someone-else").await.unwrap();
        store.apply(task_set()).await;
        store.close_watches().await;
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn merge_patch_updates_status_and_is_logged() {
        let store = InMemoryStore::new();
        store.apply(task_set()).await;

        let patch = serde_json::json!({"status": {"nodes": {"n1": {"phase": "Succeeded"}}}});
        store.merge_patch("wf", &patch).await.unwrap();

        let ts = store.task_set().await.unwrap();
        assert_eq!(
            ts.node_results().unwrap()["n1"].phase,
            Some(NodePhase::Succeeded)
        );
        assert!(ts.spec.tasks.contains_key("n1"));
        assert_eq!(store.patches().await, vec![patch]);
    }

    #[tokio::test]
    async fn queued_failures_are_returned_once() {
        let store = InMemoryStore::new();
        store.apply(task_set()).await;
        store
            .fail_next_patch(StoreError::conflict("the object has been modified"))
            .await;

        let patch = serde_json::json!({"status": {"nodes": {}}});
        assert!(store.merge_patch("wf", &patch).await.unwrap_err().is_transient());
        store.merge_patch("wf", &patch).await.unwrap();
        assert_eq!(store.patch_attempts().await, 2);
        assert_eq!(store.patches().await.len(), 1);

        store
            .fail_next_watch(StoreError::Network("connection refused".into()))
            .await;
        assert!(store.watch("wf").await.is_err());
        assert!(store.watch("wf").await.is_ok());
        assert_eq!(store.subscriptions().await, 1);
    }

    #[tokio::test]
    async fn patching_a_missing_task_set_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .merge_patch("wf", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn secrets_can_change_between_reads() {
        let store = InMemoryStore::new();
        store.set_secret("argo", "creds", "token", b"one").await;
        assert_eq!(store.get_secret("argo", "creds", "token").await.unwrap(), b"one");

        store.set_secret("argo", "creds", "token", b"two").await;
        assert_eq!(store.get_secret("argo", "creds", "token").await.unwrap(), b"two");

        assert!(store.get_secret("argo", "creds", "other").await.is_err());
    }
}
