use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Checkpoint, NodeExecutionResult};
use crate::types::{ExecutionId, ExecutionStatus, GraphId, NodeId};

/// One observable transition in the engine, multiplexed per execution id.
///
/// Events are emitted synchronously with the transition that produced them
/// and delivered FIFO per execution through the [`EventBus`](super::EventBus).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new execution was registered in the state store.
    Initialized {
        execution_id: ExecutionId,
        graph_id: GraphId,
    },
    /// The execution-level status machine advanced.
    StatusChanged {
        execution_id: ExecutionId,
        previous_status: ExecutionStatus,
        new_status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
    /// A node transitioned to `executing`.
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
        step: u64,
        input: Value,
    },
    /// A node settled successfully.
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        step: u64,
        result: NodeExecutionResult,
    },
    /// A node settled with an error.
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        step: u64,
        error: String,
    },
    /// Explicit input was attached to a node.
    NodeInputSet {
        execution_id: ExecutionId,
        node_id: NodeId,
        data: Value,
    },
    /// A checkpoint was appended to the execution's list.
    CheckpointCreated {
        execution_id: ExecutionId,
        checkpoint_id: String,
        checkpoint: Box<Checkpoint>,
    },
    /// Live state was replaced from a checkpoint snapshot.
    StateRestored {
        execution_id: ExecutionId,
        checkpoint_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Per-execution memory was released.
    CleanupCompleted { execution_id: ExecutionId },
    /// The scheduler finished driving an execution.
    ExecutionCompleted {
        execution_id: ExecutionId,
        status: ExecutionStatus,
    },
    /// Aggregate metrics snapshot from the scheduler.
    Metrics {
        execution_id: ExecutionId,
        metrics: Value,
    },
    /// Free-form engine diagnostics (not tied to one transition).
    Diagnostic { scope: String, message: String },
}

impl Event {
    /// The execution this event belongs to, if any.
    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            Event::Initialized { execution_id, .. }
            | Event::StatusChanged { execution_id, .. }
            | Event::NodeStarted { execution_id, .. }
            | Event::NodeCompleted { execution_id, .. }
            | Event::NodeFailed { execution_id, .. }
            | Event::NodeInputSet { execution_id, .. }
            | Event::CheckpointCreated { execution_id, .. }
            | Event::StateRestored { execution_id, .. }
            | Event::CleanupCompleted { execution_id }
            | Event::ExecutionCompleted { execution_id, .. }
            | Event::Metrics { execution_id, .. } => Some(execution_id),
            Event::Diagnostic { .. } => None,
        }
    }

    /// Stable event name matching the serialized `type` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initialized { .. } => "initialized",
            Event::StatusChanged { .. } => "status_changed",
            Event::NodeStarted { .. } => "node_started",
            Event::NodeCompleted { .. } => "node_completed",
            Event::NodeFailed { .. } => "node_failed",
            Event::NodeInputSet { .. } => "node_input_set",
            Event::CheckpointCreated { .. } => "checkpoint_created",
            Event::StateRestored { .. } => "state_restored",
            Event::CleanupCompleted { .. } => "cleanup_completed",
            Event::ExecutionCompleted { .. } => "execution_completed",
            Event::Metrics { .. } => "metrics",
            Event::Diagnostic { .. } => "diagnostic",
        }
    }

    /// The node this event concerns, if node-scoped.
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Event::NodeStarted { node_id, .. }
            | Event::NodeCompleted { node_id, .. }
            | Event::NodeFailed { node_id, .. }
            | Event::NodeInputSet { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    /// Serialize to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Initialized {
                execution_id,
                graph_id,
            } => write!(f, "[{execution_id}] initialized graph {graph_id}"),
            Event::StatusChanged {
                execution_id,
                previous_status,
                new_status,
                ..
            } => write!(f, "[{execution_id}] {previous_status} -> {new_status}"),
            Event::NodeStarted {
                execution_id,
                node_id,
                step,
                ..
            } => write!(f, "[{execution_id}@{step}] node {node_id} started"),
            Event::NodeCompleted {
                execution_id,
                node_id,
                step,
                ..
            } => write!(f, "[{execution_id}@{step}] node {node_id} completed"),
            Event::NodeFailed {
                execution_id,
                node_id,
                step,
                error,
            } => write!(f, "[{execution_id}@{step}] node {node_id} failed: {error}"),
            Event::NodeInputSet {
                execution_id,
                node_id,
                ..
            } => write!(f, "[{execution_id}] input set for node {node_id}"),
            Event::CheckpointCreated {
                execution_id,
                checkpoint_id,
                checkpoint,
            } => write!(
                f,
                "[{execution_id}] checkpoint {checkpoint_id} ({})",
                checkpoint.metadata.label
            ),
            Event::StateRestored {
                execution_id,
                checkpoint_id,
                ..
            } => write!(f, "[{execution_id}] restored from checkpoint {checkpoint_id}"),
            Event::CleanupCompleted { execution_id } => {
                write!(f, "[{execution_id}] cleaned up")
            }
            Event::ExecutionCompleted {
                execution_id,
                status,
            } => write!(f, "[{execution_id}] execution finished: {status}"),
            Event::Metrics { execution_id, .. } => write!(f, "[{execution_id}] metrics"),
            Event::Diagnostic { scope, message } => write!(f, "[{scope}] {message}"),
        }
    }
}
