//! Execution-state management: live state, transitions, checkpoints.
//!
//! The store is the single source of truth while an execution runs. Each
//! execution's node set is partitioned across four disjoint sets (`pending`,
//! `executing`, `completed`, `failed`); [`StateStore`] operations move nodes
//! between them under a per-execution lock and emit an
//! [`Event`](crate::event_bus::Event) for every transition.
//!
//! Checkpoints are deep copies of the state, retained FIFO up to the
//! policy's limit, and can be taken manually, after every node completion,
//! or on a timer (see [`CheckpointFrequency`]).
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use gridflow::store::{CheckpointPolicy, NodeExecutionResult, StateStore};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), gridflow::store::StateError> {
//! let store = Arc::new(StateStore::new(CheckpointPolicy::default()));
//! store.initialize("exec-1", "graph-1", ["a".to_string()], json!({}))?;
//!
//! store.start_node("exec-1", "a", json!({"seed": 1}))?;
//! let result = NodeExecutionResult::success("a", json!(2), chrono::Utc::now(), 0);
//! store.complete_node("exec-1", "a", result)?;
//!
//! assert_eq!(store.get_node_output("exec-1", "a"), Some(json!(2)));
//! assert_eq!(store.get_progress("exec-1").unwrap().percentage, 100);
//! # Ok(())
//! # }
//! ```

mod checkpoint;
mod state;
#[allow(clippy::module_inception)]
mod store;

pub use checkpoint::{Checkpoint, CheckpointFrequency, CheckpointMetadata, CheckpointPolicy};
pub use state::{
    ExecutionProgress, ExecutionState, ExecutionStep, NodeExecutionResult, NodeResultMetadata,
    PerformanceMetrics, ResourceUsage, StepKind, INPUT_KEY_SUFFIX,
};
pub use store::{StateError, StateStore};
