//! The considered set: node ids that have already been picked up.

use flowhand_core::NodeId;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Tracks node ids that were handed to a strategy.
///
/// Entries are never removed; the set lives as long as the agent.
#[derive(Debug, Default)]
pub struct DedupGuard {
    considered: Mutex<HashSet<NodeId>>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `node_id` as considered. Returns `false` if it already was.
    ///
    /// The check and the mark happen under one lock, so exactly one caller
    /// wins for each id.
    pub fn try_claim(&self, node_id: &str) -> bool {
        let mut considered = self.considered.lock().unwrap_or_else(PoisonError::into_inner);
        if considered.contains(node_id) {
            return false;
        }
        considered.insert(node_id.to_string())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.considered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(node_id)
    }

    pub fn len(&self) -> usize {
        self.considered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
