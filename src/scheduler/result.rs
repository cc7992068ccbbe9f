//! Final execution result and its metrics.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scheduler::config::Strategy;
use crate::store::{NodeExecutionResult, ResourceUsage};
use crate::types::{ExecutionId, ExecutionStatus, NodeId};

/// Error code attached to a globally timed-out execution.
pub const GRAPH_EXECUTION_TIMEOUT: &str = "GRAPH_EXECUTION_TIMEOUT";

/// Structured error carried inside a failed [`ExecutionResult`].
///
/// Summarizes the execution-level outcome: a global timeout, a
/// cancellation, or a roll-up of node failures. Per-node detail stays in
/// `results`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionErrorInfo {
    pub code: String,
    pub message: String,
    pub context: Value,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionErrorInfo {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>, context: Value) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context,
            timestamp: Utc::now(),
        }
    }
}

/// Identity and timing of the finished execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub strategy: Strategy,
}

/// Derived ratios comparing wall-clock time to aggregate node time.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceBreakdown {
    /// Settled nodes per second of wall-clock time.
    pub throughput: f64,
    /// `parallelization / max_concurrency`: how much of the configured
    /// budget was actually used.
    pub efficiency: f64,
    /// `sum(node durations) / wall-clock total`; 1.0 means fully serial,
    /// higher means overlap.
    pub parallelization: f64,
}

/// Timing and resource aggregates for one execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionMetrics {
    pub total_time_ms: u64,
    pub node_execution_times: FxHashMap<NodeId, u64>,
    pub resource_usage: ResourceUsage,
    pub performance: PerformanceBreakdown,
}

impl ExecutionMetrics {
    /// Compute aggregates from settled node results and wall-clock bounds.
    #[must_use]
    pub fn from_results(
        results: &FxHashMap<NodeId, NodeExecutionResult>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_concurrency: usize,
    ) -> Self {
        let total_time_ms = (end - start).num_milliseconds().max(0) as u64;
        let node_execution_times: FxHashMap<NodeId, u64> = results
            .iter()
            .map(|(id, r)| (id.clone(), r.duration_ms))
            .collect();
        let mut resource_usage = ResourceUsage::default();
        for result in results.values() {
            resource_usage.absorb(&result.resource_usage);
        }
        let node_time_sum: u64 = node_execution_times.values().sum();
        let wall_secs = total_time_ms as f64 / 1000.0;
        let throughput = if wall_secs > 0.0 {
            results.len() as f64 / wall_secs
        } else {
            0.0
        };
        let parallelization = if total_time_ms > 0 {
            node_time_sum as f64 / total_time_ms as f64
        } else {
            0.0
        };
        let efficiency = if max_concurrency > 0 {
            parallelization / max_concurrency as f64
        } else {
            0.0
        };
        Self {
            total_time_ms,
            node_execution_times,
            resource_usage,
            performance: PerformanceBreakdown {
                throughput,
                efficiency,
                parallelization,
            },
        }
    }
}

/// Everything the scheduler hands back for one execution.
///
/// `success` is true iff the execution completed with no failed nodes and
/// no execution-level error. Partial results survive failure: every node
/// that settled (or was skipped/cancelled by propagation) has an entry in
/// `results`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub results: FxHashMap<NodeId, NodeExecutionResult>,
    pub execution: ExecutionSummary,
    pub metrics: ExecutionMetrics,
    pub error: Option<ExecutionErrorInfo>,
}

impl ExecutionResult {
    /// Node ids that settled as failed (excluding skipped/cancelled).
    pub fn failed_nodes(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, r)| r.status == crate::types::NodeStatus::Failed)
            .map(|(id, _)| id.as_str())
    }
}
