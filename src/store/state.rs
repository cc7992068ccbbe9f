//! Live execution state and its derived projections.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ExecutionId, ExecutionStatus, GraphId, NodeId, NodeStatus};

/// Suffix appended to a node id to form its explicit-input key in
/// [`ExecutionState::data_state`].
pub const INPUT_KEY_SUFFIX: &str = "_input";

/// Per-attempt resource accounting attached to a node result.
///
/// Populated by the scheduler from what it can observe; fields it cannot
/// measure stay zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub cpu_ms: u64,
    pub disk_bytes: u64,
    pub network_bytes: u64,
}

impl ResourceUsage {
    /// Accumulate another node's usage into this total.
    pub fn absorb(&mut self, other: &ResourceUsage) {
        self.memory_bytes += other.memory_bytes;
        self.cpu_ms += other.cpu_ms;
        self.disk_bytes += other.disk_bytes;
        self.network_bytes += other.network_bytes;
    }
}

/// Bookkeeping recorded alongside a node's settled result.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeResultMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Number of re-admissions before settling (0 = first attempt stuck).
    pub retry_count: u32,
}

/// The settled outcome of one node within an execution.
///
/// Written exactly once per settlement; a retried node overwrites its
/// previous failed record when it settles again.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeExecutionResult {
    pub node_id: NodeId,
    pub status: NodeStatus,
    /// Output value on success, `null` otherwise.
    pub output: Value,
    /// Error description on failure.
    pub error: Option<String>,
    pub duration_ms: u64,
    pub resource_usage: ResourceUsage,
    pub metadata: NodeResultMetadata,
}

impl NodeExecutionResult {
    /// A successful result with the given output.
    #[must_use]
    pub fn success(
        node_id: impl Into<NodeId>,
        output: Value,
        started: DateTime<Utc>,
        retry_count: u32,
    ) -> Self {
        let end = Utc::now();
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Completed,
            output,
            error: None,
            duration_ms: duration_ms_between(started, end),
            resource_usage: ResourceUsage::default(),
            metadata: NodeResultMetadata {
                start_time: started,
                end_time: end,
                retry_count,
            },
        }
    }

    /// A failed result carrying the error description.
    #[must_use]
    pub fn failure(
        node_id: impl Into<NodeId>,
        status: NodeStatus,
        error: impl Into<String>,
        started: DateTime<Utc>,
        retry_count: u32,
    ) -> Self {
        let end = Utc::now();
        Self {
            node_id: node_id.into(),
            status,
            output: Value::Null,
            error: Some(error.into()),
            duration_ms: duration_ms_between(started, end),
            resource_usage: ResourceUsage::default(),
            metadata: NodeResultMetadata {
                start_time: started,
                end_time: end,
                retry_count,
            },
        }
    }
}

fn duration_ms_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

/// Kind tag of a recorded execution step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    NodeStart,
    NodeComplete,
    NodeError,
}

/// One entry in the execution's append-only step log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStep {
    pub index: u64,
    pub kind: StepKind,
    pub node_id: NodeId,
    pub at: DateTime<Utc>,
}

/// Coarse progress projection derived from the node sets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionProgress {
    pub total_nodes: usize,
    pub completed_nodes: usize,
    /// `round(completed / total * 100)`, 0 for an empty graph.
    pub percentage: u32,
    pub current_phase: String,
}

/// Aggregate performance projection over an execution's results.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    /// `|failed| / total_nodes` as a fraction in `[0, 1]`.
    pub error_rate: f64,
    /// Sum of retry counts over every settled node, per completed node, as
    /// a percentage. Retries spent on nodes that ultimately failed count.
    pub retry_rate: f64,
    pub total_duration_ms: u64,
    pub node_execution_times: FxHashMap<NodeId, u64>,
}

/// Full mutable state of one execution.
///
/// Invariant: `pending`, `executing`, `completed`, and `failed` are pairwise
/// disjoint and their union is exactly the node set of the graph being
/// executed. Every mutation on [`StateStore`](super::StateStore) preserves
/// this.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionState {
    pub execution_id: ExecutionId,
    pub graph_id: GraphId,
    pub status: ExecutionStatus,
    pub pending: FxHashSet<NodeId>,
    pub executing: FxHashSet<NodeId>,
    pub completed: FxHashSet<NodeId>,
    pub failed: FxHashSet<NodeId>,
    /// Settled results keyed by node id.
    pub node_results: FxHashMap<NodeId, NodeExecutionResult>,
    /// Flat data map: node outputs under the node id, explicit inputs under
    /// `<node_id>_input`.
    pub data_state: FxHashMap<String, Value>,
    /// Caller-supplied metadata, immutable for the execution's lifetime.
    pub context: Value,
    pub start_time: DateTime<Utc>,
    /// Timestamp of the most recent mutation.
    pub current_time: DateTime<Utc>,
    /// Append-only transition log.
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionState {
    /// Fresh state with every node pending.
    #[must_use]
    pub fn new(
        execution_id: impl Into<ExecutionId>,
        graph_id: impl Into<GraphId>,
        node_ids: impl IntoIterator<Item = NodeId>,
        context: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id: execution_id.into(),
            graph_id: graph_id.into(),
            status: ExecutionStatus::Pending,
            pending: node_ids.into_iter().collect(),
            executing: FxHashSet::default(),
            completed: FxHashSet::default(),
            failed: FxHashSet::default(),
            node_results: FxHashMap::default(),
            data_state: FxHashMap::default(),
            context,
            start_time: now,
            current_time: now,
            steps: Vec::new(),
        }
    }

    /// Total node count across all four sets.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.pending.len() + self.executing.len() + self.completed.len() + self.failed.len()
    }

    /// Derived progress snapshot. The phase is computed from the current
    /// status and the size of the executing set, never cached.
    #[must_use]
    pub fn progress(&self) -> ExecutionProgress {
        let total = self.total_nodes();
        let completed = self.completed.len();
        let percentage = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        let current_phase = match self.status {
            ExecutionStatus::Completed => "completed".to_string(),
            ExecutionStatus::Failed | ExecutionStatus::Cancelled | ExecutionStatus::Timeout => {
                "error".to_string()
            }
            ExecutionStatus::Paused => "paused".to_string(),
            ExecutionStatus::Pending | ExecutionStatus::Running => {
                if self.executing.is_empty() {
                    "Preparing nodes".to_string()
                } else {
                    format!("Executing {} nodes", self.executing.len())
                }
            }
        };
        ExecutionProgress {
            total_nodes: total,
            completed_nodes: completed,
            percentage,
            current_phase,
        }
    }

    /// Derived performance snapshot.
    #[must_use]
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let total = self.total_nodes();
        let error_rate = if total == 0 {
            0.0
        } else {
            self.failed.len() as f64 / total as f64
        };
        let retries: u32 = self
            .node_results
            .values()
            .map(|r| r.metadata.retry_count)
            .sum();
        let retry_rate = if self.completed.is_empty() {
            0.0
        } else {
            f64::from(retries) / self.completed.len() as f64 * 100.0
        };
        let node_execution_times = self
            .node_results
            .iter()
            .map(|(id, r)| (id.clone(), r.duration_ms))
            .collect();
        PerformanceMetrics {
            error_rate,
            retry_rate,
            total_duration_ms: duration_ms_between(self.start_time, self.current_time),
            node_execution_times,
        }
    }

    /// Record one step-log entry and return its index.
    pub(crate) fn push_step(&mut self, kind: StepKind, node_id: &str) -> u64 {
        let index = self.steps.len() as u64;
        self.steps.push(ExecutionStep {
            index,
            kind,
            node_id: node_id.to_string(),
            at: Utc::now(),
        });
        index
    }

    /// Whether the four node sets are pairwise disjoint. Checked by tests
    /// and debug assertions, never relied on at runtime.
    #[must_use]
    pub fn sets_disjoint(&self) -> bool {
        let sets = [&self.pending, &self.executing, &self.completed, &self.failed];
        for (i, a) in sets.iter().enumerate() {
            for b in &sets[i + 1..] {
                if a.intersection(b).next().is_some() {
                    return false;
                }
            }
        }
        true
    }
}
