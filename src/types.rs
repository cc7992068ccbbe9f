//! Core types for the gridflow workflow engine.
//!
//! This module defines the fundamental vocabulary used throughout the system:
//! node and edge kinds, per-node and per-execution status machines, and the
//! id aliases shared by the compiler, scheduler, and state store.
//!
//! # Key Types
//!
//! - [`NodeType`]: the typed-node taxonomy of a workflow graph
//! - [`EdgeType`]: data-flow vs. control vs. conditional edges
//! - [`NodeStatus`] / [`ExecutionStatus`]: the two state machines enforced by
//!   the state store
//!
//! # Examples
//!
//! ```rust
//! use gridflow::types::{EdgeType, NodeType, NodeStatus};
//!
//! let transform = NodeType::Transform;
//! assert_eq!(transform.as_str(), "transform");
//!
//! // Custom node types carry a caller-chosen tag
//! let custom = NodeType::Custom("sentiment".to_string());
//! assert_eq!(custom.as_str(), "sentiment");
//!
//! assert_eq!(NodeStatus::Pending.to_string(), "pending");
//! assert!(EdgeType::Data.carries_data());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node within a graph definition. Unique per graph.
pub type NodeId = String;

/// Identifier of one run of a graph. Unique per state store.
pub type ExecutionId = String;

/// Identifier of a graph definition.
pub type GraphId = String;

/// The type tag of a node in a workflow graph.
///
/// The engine itself attaches no behavior to a node type beyond executor
/// lookup: node execution is supplied by the caller through an
/// [`ExecutorRegistry`](crate::executor::ExecutorRegistry) keyed by this tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Entry node that injects external input into the graph.
    Input,
    /// Pure data transformation.
    Transform,
    /// Call into an agent (opaque async operation from the engine's view).
    AgentCall,
    /// Call into an external tool.
    ToolCall,
    /// Conditional branch point.
    Condition,
    /// Fan-in of multiple branches.
    Merge,
    /// Fan-out into multiple branches.
    Split,
    /// Loop construct driven by caller-supplied logic.
    Loop,
    /// Timed delay.
    Delay,
    /// Caller-defined node type identified by tag.
    #[serde(untagged)]
    Custom(String),
}

impl NodeType {
    /// The canonical string tag used for executor lookup and serialization.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Input => "input",
            NodeType::Transform => "transform",
            NodeType::AgentCall => "agent_call",
            NodeType::ToolCall => "tool_call",
            NodeType::Condition => "condition",
            NodeType::Merge => "merge",
            NodeType::Split => "split",
            NodeType::Loop => "loop",
            NodeType::Delay => "delay",
            NodeType::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        match s {
            "input" => NodeType::Input,
            "transform" => NodeType::Transform,
            "agent_call" => NodeType::AgentCall,
            "tool_call" => NodeType::ToolCall,
            "condition" => NodeType::Condition,
            "merge" => NodeType::Merge,
            "split" => NodeType::Split,
            "loop" => NodeType::Loop,
            "delay" => NodeType::Delay,
            other => NodeType::Custom(other.to_string()),
        }
    }
}

/// The kind of a directed edge between two nodes.
///
/// `Data` edges carry the producing node's output into the consumer's input.
/// `Control` and `Conditional` edges gate traversal without moving data; all
/// three contribute to dependency ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Output of `from` flows into the input of `to`.
    Data,
    /// Pure ordering constraint.
    Control,
    /// Ordering constraint guarded by a condition expression.
    Conditional,
}

impl EdgeType {
    /// Returns `true` if this edge carries output data downstream.
    #[must_use]
    pub fn carries_data(&self) -> bool {
        matches!(self, EdgeType::Data)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeType::Data => write!(f, "data"),
            EdgeType::Control => write!(f, "control"),
            EdgeType::Conditional => write!(f, "conditional"),
        }
    }
}

/// Per-node status within one execution.
///
/// The state store enforces `Pending -> Executing -> {Completed | Failed}`;
/// `Failed` may re-enter `Executing` only through an explicit retry
/// re-admission. `Skipped`, `Cancelled`, and `Timeout` are terminal statuses
/// recorded on results for nodes the scheduler never ran to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
    Cancelled,
    Timeout,
}

impl NodeStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Executing => "executing",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
            NodeStatus::Cancelled => "cancelled",
            NodeStatus::Timeout => "timeout",
        }
    }

    /// Returns `true` if the node can never run again within this execution.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeStatus::Pending | NodeStatus::Executing)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one execution as a whole.
///
/// Legal transitions: `Pending -> Running -> {Completed | Failed | Cancelled
/// | Timeout}`, with `Running <-> Paused` permitted in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Timeout => "timeout",
        }
    }

    /// Returns `true` for statuses from which no further transition is legal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::Timeout
        )
    }

    /// Whether a transition from `self` to `next` is allowed by the
    /// execution-level state machine.
    #[must_use]
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) | (Running, Timeout) => {
                true
            }
            // The global timer or the final drain can land while paused.
            (Paused, Cancelled) | (Paused, Failed) | (Paused, Timeout) | (Paused, Completed) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips_through_str() {
        for tag in [
            "input",
            "transform",
            "agent_call",
            "tool_call",
            "condition",
            "merge",
            "split",
            "loop",
            "delay",
        ] {
            assert_eq!(NodeType::from(tag).as_str(), tag);
        }
        assert_eq!(NodeType::from("my_node").as_str(), "my_node");
    }

    #[test]
    fn execution_status_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Timeout));
        assert!(Paused.can_transition_to(Timeout));
        assert!(Paused.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn terminal_statuses() {
        assert!(NodeStatus::Skipped.is_terminal());
        assert!(!NodeStatus::Executing.is_terminal());
        assert!(ExecutionStatus::Timeout.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
    }
}
