//! Execution scheduling: strategies, retries, timeouts, propagation.
//!
//! The scheduler walks an [`ExecutableGraph`](crate::compiler::ExecutableGraph)
//! level by level (or via a global ready queue under
//! [`Strategy::Adaptive`]), dispatching up to `max_concurrency` nodes at a
//! time and recording every transition through the
//! [`StateStore`](crate::store::StateStore). Failures go through the
//! configured [`RetryPolicy`] and then the configured
//! [`FailurePropagation`] strategy.
//!
//! Ordering guarantees: within a level, nodes are offered in definition
//! order; a node is never dispatched before all of its dependencies are
//! observed as completed; completion order across concurrent nodes is not
//! guaranteed.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gridflow::compiler::GraphCompiler;
//! use gridflow::definition::GraphDefinition;
//! use gridflow::executor::{ExecutorRegistry, PassthroughExecutor};
//! use gridflow::scheduler::{ExecutionConfig, Scheduler};
//! use gridflow::store::StateStore;
//! use gridflow::types::{EdgeType, NodeType};
//! use serde_json::json;
//!
//! # async fn demo() -> miette::Result<()> {
//! let def = GraphDefinition::builder("pipeline")
//!     .add_node("input", NodeType::Input)
//!     .add_node("output", NodeType::Transform)
//!     .add_edge("input", "output", EdgeType::Data)
//!     .build();
//! let graph = GraphCompiler::default().build(&def)?;
//!
//! let store = Arc::new(StateStore::default());
//! store.initialize("exec-1", &def.id, def.node_ids(), json!({}))?;
//!
//! let registry = ExecutorRegistry::new()
//!     .with_executor("input", PassthroughExecutor)
//!     .with_executor("transform", PassthroughExecutor);
//! let scheduler = Scheduler::new(Arc::clone(&store), registry);
//! let result = scheduler
//!     .execute("exec-1", &graph, json!({"seed": 1}), &ExecutionConfig::default())
//!     .await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

mod config;
mod result;
#[allow(clippy::module_inception)]
mod scheduler;

pub use config::{BackoffStrategy, ExecutionConfig, FailurePropagation, RetryPolicy, Strategy};
pub use result::{
    ExecutionErrorInfo, ExecutionMetrics, ExecutionResult, ExecutionSummary,
    PerformanceBreakdown, GRAPH_EXECUTION_TIMEOUT,
};
pub use scheduler::{Scheduler, SchedulerError};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::GraphCompiler;
    use crate::definition::GraphDefinition;
    use crate::executor::{
        DelayExecutor, ExecutionContext, ExecutorRegistry, NodeError, NodeExecutor,
        PassthroughExecutor,
    };
    use crate::store::StateStore;
    use crate::types::{EdgeType, ExecutionStatus, NodeStatus, NodeType};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysFail;

    #[async_trait]
    impl NodeExecutor for AlwaysFail {
        async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
            Err(NodeError::Transient("induced failure".into()))
        }
    }

    /// Fails the first `n` attempts, then succeeds.
    struct FlakyExecutor {
        failures: u32,
        seen: AtomicU32,
    }

    #[async_trait]
    impl NodeExecutor for FlakyExecutor {
        async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
            if self.seen.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(NodeError::Transient("not yet".into()));
            }
            Ok(input)
        }
    }

    fn linear_def() -> GraphDefinition {
        GraphDefinition::builder("linear")
            .add_node("input", NodeType::Input)
            .add_node("transform", NodeType::Transform)
            .add_node("output", NodeType::Transform)
            .add_edge("input", "transform", EdgeType::Data)
            .add_edge("transform", "output", EdgeType::Data)
            .with_output_node("output")
            .build()
    }

    fn passthrough_registry() -> ExecutorRegistry {
        ExecutorRegistry::new()
            .with_executor("input", PassthroughExecutor)
            .with_executor("transform", PassthroughExecutor)
    }

    fn setup(def: &GraphDefinition) -> Arc<StateStore> {
        let store = Arc::new(StateStore::default());
        store
            .initialize("exec-1", &def.id, def.node_ids(), json!({}))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn sequential_linear_graph_completes() {
        let def = linear_def();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let scheduler = Scheduler::new(Arc::clone(&store), passthrough_registry());
        let config = ExecutionConfig::default().with_strategy(Strategy::Sequential);

        let result = scheduler
            .execute("exec-1", &graph, json!({"seed": 1}), &config)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.execution.status, ExecutionStatus::Completed);
        assert_eq!(result.results.len(), 3);
        // Passthrough chain: the root input flows all the way through.
        assert_eq!(result.results["output"].output, json!({"seed": 1}));
        assert_eq!(store.get_progress("exec-1").unwrap().percentage, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_leaves_retry_count_two() {
        let def = GraphDefinition::builder("flaky")
            .add_node("doomed", NodeType::Transform)
            .build();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let registry = ExecutorRegistry::new().with_executor("transform", AlwaysFail);
        let scheduler = Scheduler::new(Arc::clone(&store), registry);

        let result = scheduler
            .execute("exec-1", &graph, json!(null), &ExecutionConfig::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.execution.status, ExecutionStatus::Failed);
        let doomed = &result.results["doomed"];
        assert_eq!(doomed.status, NodeStatus::Failed);
        // max_attempts = 3: the initial attempt plus 2 retries.
        assert_eq!(doomed.metadata.retry_count, 2);
        assert_eq!(
            result.error.as_ref().unwrap().code,
            "NODE_EXECUTION_FAILED"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_node_recovers_within_policy() {
        let def = GraphDefinition::builder("flaky")
            .add_node("wobbly", NodeType::Transform)
            .build();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let registry = ExecutorRegistry::new().with_executor(
            "transform",
            FlakyExecutor {
                failures: 2,
                seen: AtomicU32::new(0),
            },
        );
        let scheduler = Scheduler::new(Arc::clone(&store), registry);

        let result = scheduler
            .execute("exec-1", &graph, json!("payload"), &ExecutionConfig::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.results["wobbly"].metadata.retry_count, 2);
        assert_eq!(result.results["wobbly"].output, json!("payload"));
    }

    #[tokio::test]
    async fn continue_propagation_skips_only_dependents() {
        // fails: a -> b; independent: c
        let def = GraphDefinition::builder("branching")
            .add_node("a", NodeType::Transform)
            .add_node("b", NodeType::Transform)
            .add_node("c", NodeType::Input)
            .add_edge("a", "b", EdgeType::Data)
            .with_output_node("b")
            .with_output_node("c")
            .build();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let registry = ExecutorRegistry::new()
            .with_executor("transform", AlwaysFail)
            .with_executor("input", PassthroughExecutor);
        let scheduler = Scheduler::new(Arc::clone(&store), registry);
        let config = ExecutionConfig::default()
            .with_strategy(Strategy::Sequential)
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            })
            .with_failure_propagation(FailurePropagation::Continue);

        let result = scheduler
            .execute("exec-1", &graph, json!(1), &config)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.results["a"].status, NodeStatus::Failed);
        assert_eq!(result.results["b"].status, NodeStatus::Skipped);
        assert_eq!(result.results["c"].status, NodeStatus::Completed);
    }

    #[tokio::test]
    async fn fail_fast_cancels_unstarted_nodes() {
        let def = linear_def();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let registry = ExecutorRegistry::new()
            .with_executor("input", AlwaysFail)
            .with_executor("transform", PassthroughExecutor);
        let scheduler = Scheduler::new(Arc::clone(&store), registry);
        let config = ExecutionConfig::default()
            .with_strategy(Strategy::Sequential)
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            });

        let result = scheduler
            .execute("exec-1", &graph, json!(1), &config)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.results["input"].status, NodeStatus::Failed);
        assert_eq!(result.results["transform"].status, NodeStatus::Cancelled);
        assert_eq!(result.results["output"].status, NodeStatus::Cancelled);
    }

    #[tokio::test]
    async fn adaptive_strategy_settles_every_node() {
        let def = GraphDefinition::builder("diamond")
            .add_node("a", NodeType::Input)
            .add_node("b", NodeType::Transform)
            .add_node("c", NodeType::Transform)
            .add_node("d", NodeType::Merge)
            .add_edge("a", "b", EdgeType::Data)
            .add_edge("a", "c", EdgeType::Data)
            .add_edge("b", "d", EdgeType::Data)
            .add_edge("c", "d", EdgeType::Data)
            .with_output_node("d")
            .build();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let registry = passthrough_registry().with_executor("merge", PassthroughExecutor);
        let scheduler = Scheduler::new(Arc::clone(&store), registry);
        let config = ExecutionConfig::default().with_strategy(Strategy::Adaptive);

        let result = scheduler
            .execute("exec-1", &graph, json!(7), &config)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.results.len(), 4);
        // Merge node with two dependencies receives an object keyed by id.
        assert_eq!(result.results["d"].output, json!({"b": 7, "c": 7}));
    }

    #[tokio::test(start_paused = true)]
    async fn global_timeout_reports_graph_execution_timeout() {
        let def = GraphDefinition::builder("slow")
            .add_node_with_config("sleepy", NodeType::Delay, json!({"delay_ms": 60_000}))
            .build();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let registry = ExecutorRegistry::new().with_executor("delay", DelayExecutor);
        let scheduler = Scheduler::new(Arc::clone(&store), registry);
        let config =
            ExecutionConfig::default().with_timeout(std::time::Duration::from_millis(100));

        let result = scheduler
            .execute("exec-1", &graph, json!(null), &config)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.execution.status, ExecutionStatus::Timeout);
        assert_eq!(result.error.as_ref().unwrap().code, GRAPH_EXECUTION_TIMEOUT);
        // The in-flight node was settled, not left dangling in `executing`.
        let state = store.get_state("exec-1").unwrap();
        assert!(state.executing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn per_node_timeout_settles_as_timeout_status() {
        let def = GraphDefinition::builder("slow-node")
            .add_node_with_config(
                "sleepy",
                NodeType::Delay,
                json!({"delay_ms": 60_000, "timeout_ms": 100}),
            )
            .build();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let registry = ExecutorRegistry::new().with_executor("delay", DelayExecutor);
        let scheduler = Scheduler::new(Arc::clone(&store), registry);

        let result = scheduler
            .execute("exec-1", &graph, json!(null), &ExecutionConfig::default())
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.results["sleepy"].status, NodeStatus::Timeout);
    }

    #[tokio::test]
    async fn missing_executor_is_a_configuration_fault() {
        let def = linear_def();
        let graph = GraphCompiler::default().build(&def).unwrap();
        let store = setup(&def);
        let scheduler = Scheduler::new(store, ExecutorRegistry::new());

        let err = scheduler
            .execute("exec-1", &graph, json!(null), &ExecutionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::MissingExecutor { .. }));
    }
}
