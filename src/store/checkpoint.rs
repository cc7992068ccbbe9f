//! Checkpoint snapshots and the auto-checkpoint policy.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::store::state::ExecutionState;
use crate::types::ExecutionId;

/// When automatic checkpoints are taken.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointFrequency {
    /// After every node completion.
    Node,
    /// On a fixed wall-clock interval while the execution is live.
    Time,
    /// Only when [`StateStore::create_checkpoint`](super::StateStore::create_checkpoint)
    /// is called explicitly.
    #[default]
    Manual,
}

/// Checkpointing policy for a store instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointPolicy {
    pub enabled: bool,
    pub frequency: CheckpointFrequency,
    /// Interval between automatic snapshots under
    /// [`CheckpointFrequency::Time`].
    pub interval: Duration,
    /// Maximum checkpoints retained per execution; the oldest is dropped
    /// first (FIFO).
    pub retention: usize,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: CheckpointFrequency::Manual,
            interval: Duration::from_secs(60),
            retention: 10,
        }
    }
}

/// Descriptive metadata carried with a checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    pub label: String,
    pub completed_nodes: usize,
    pub failed_nodes: usize,
}

/// A point-in-time deep copy of an execution's state.
///
/// `state` already contains `data_state`; `data_snapshot` duplicates it at
/// the top level so consumers can inspect data without digging into the
/// state structure.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub id: String,
    pub execution_id: ExecutionId,
    pub timestamp: DateTime<Utc>,
    pub state: ExecutionState,
    pub data_snapshot: FxHashMap<String, Value>,
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Capture the given live state under a label.
    #[must_use]
    pub fn capture(state: &ExecutionState, label: impl Into<String>) -> Self {
        Self {
            id: format!("cp-{}", Uuid::new_v4()),
            execution_id: state.execution_id.clone(),
            timestamp: Utc::now(),
            state: state.clone(),
            data_snapshot: state.data_state.clone(),
            metadata: CheckpointMetadata {
                label: label.into(),
                completed_nodes: state.completed.len(),
                failed_nodes: state.failed.len(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capture_is_a_deep_copy() {
        let mut state = ExecutionState::new(
            "exec-1",
            "g",
            ["a".to_string(), "b".to_string()],
            json!({}),
        );
        state.data_state.insert("a".into(), json!(41));
        let cp = Checkpoint::capture(&state, "before-mutation");

        state.data_state.insert("a".into(), json!(42));
        state.pending.remove("a");
        state.completed.insert("a".into());

        assert_eq!(cp.data_snapshot["a"], json!(41));
        assert_eq!(cp.state.data_state["a"], json!(41));
        assert!(cp.state.completed.is_empty());
        assert_eq!(cp.metadata.label, "before-mutation");
    }
}
