//! The flowhand task agent.
//!
//! One agent serves one task set:
//!
//! 1. **Intake** watches the task set and queues every task it lists
//! 2. **Workers** take tasks off the queue, skip ones already considered,
//!    execute the rest and report results (re-queueing when asked to)
//! 3. **The batcher** buffers results and writes them back every 10 seconds
//!    as a single merge patch
//!
//! The run ends when the task set is deleted or labelled completed.

pub mod agent;
pub mod batcher;
pub mod dedup;
pub mod intake;
pub mod pool;

#[cfg(test)]
mod test_helpers;

pub use agent::{Agent, DEFAULT_TASK_WORKERS};
pub use batcher::{FlushOutcome, PATCH_INTERVAL, ResultBatcher};
pub use dedup::DedupGuard;
pub use intake::Intake;
pub use pool::{Delivery, QueuedTask, TaskResult, WorkerPool};
