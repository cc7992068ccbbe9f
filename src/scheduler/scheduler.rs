//! Concurrent node dispatch over a compiled execution plan.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::compiler::ExecutableGraph;
use crate::event_bus::Event;
use crate::executor::{ExecutionContext, ExecutorRegistry, NodeExecutor, ResourceLimits};
use crate::scheduler::config::{ExecutionConfig, FailurePropagation, RetryPolicy};
use crate::scheduler::result::{
    ExecutionErrorInfo, ExecutionMetrics, ExecutionResult, ExecutionSummary,
    GRAPH_EXECUTION_TIMEOUT,
};
use crate::store::{NodeExecutionResult, StateError, StateStore};
use crate::types::{ExecutionStatus, NodeId, NodeStatus};

/// Faults that abort the `execute` call itself.
///
/// Node-level failures never surface here; they are folded into the
/// returned [`ExecutionResult`]. These variants are configuration or logic
/// faults the caller must fix.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("no executor registered for node type '{node_type}' (node '{node_id}')")]
    #[diagnostic(
        code(gridflow::scheduler::missing_executor),
        help("Register an executor for every node type in the graph before executing.")
    )]
    MissingExecutor { node_id: NodeId, node_type: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] StateError),

    #[error("node task aborted unexpectedly: {message}")]
    #[diagnostic(code(gridflow::scheduler::node_panic))]
    NodePanic { message: String },
}

enum Gate {
    Proceed,
    Cancelled,
}

/// Working set accumulated while walking the plan.
#[derive(Default)]
struct DispatchState {
    results: FxHashMap<NodeId, NodeExecutionResult>,
    completed: FxHashSet<NodeId>,
    skipped: FxHashSet<NodeId>,
    completion_order: Vec<NodeId>,
    failed: bool,
    halted: bool,
}

impl DispatchState {
    fn is_settled(&self, node_id: &str) -> bool {
        self.results.contains_key(node_id) || self.skipped.contains(node_id)
    }
}

/// Drives one execution over an [`ExecutableGraph`].
///
/// The scheduler owns no execution state itself: every node transition goes
/// through the [`StateStore`], which is the single source of truth. The
/// store must already know the execution id (via
/// [`StateStore::initialize`]) before `execute` is called.
pub struct Scheduler {
    store: Arc<StateStore>,
    registry: ExecutorRegistry,
    emitter: Option<flume::Sender<Event>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Arc<StateStore>, registry: ExecutorRegistry) -> Self {
        Self {
            store,
            registry,
            emitter: None,
        }
    }

    /// Attach an event channel for scheduler-level events
    /// (`execution_completed`, `metrics`).
    #[must_use]
    pub fn with_emitter(mut self, sender: flume::Sender<Event>) -> Self {
        self.emitter = Some(sender);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(sender) = &self.emitter {
            if sender.send(event).is_err() {
                warn!("event channel closed; dropping event");
            }
        }
    }

    /// Execute the plan to completion under the given configuration.
    ///
    /// Returns `Err` only for configuration or logic faults (missing
    /// executor, illegal store transition). Node failures, timeouts, and
    /// cancellation all produce an `Ok` result with `success: false` and
    /// whatever partial results were settled.
    #[instrument(skip(self, graph, input, config), fields(strategy = config.strategy.as_str()))]
    pub async fn execute(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        input: Value,
        config: &ExecutionConfig,
    ) -> Result<ExecutionResult, SchedulerError> {
        let initial = self
            .store
            .get_state(execution_id)
            .ok_or_else(|| StateError::UnknownExecution {
                execution_id: execution_id.to_string(),
            })?;
        for node in &graph.definition.nodes {
            if self.registry.get(node.node_type.as_str()).is_none() {
                return Err(SchedulerError::MissingExecutor {
                    node_id: node.id.clone(),
                    node_type: node.node_type.as_str().to_string(),
                });
            }
        }
        let context = initial.context.clone();
        if initial.status == ExecutionStatus::Pending {
            self.store
                .update_execution_status(execution_id, ExecutionStatus::Running)?;
        }
        let start = Utc::now();

        let dispatch = self.dispatch(execution_id, graph, config, &context, &input);
        let (mut state, timed_out) = match config.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, dispatch).await {
                Ok(outcome) => (outcome?, false),
                Err(_) => (self.recover_after_timeout(execution_id), true),
            },
            None => (dispatch.await?, false),
        };

        // Anything never admitted after an early halt is reported cancelled;
        // the store keeps those nodes pending.
        if state.halted || timed_out {
            for node in &graph.definition.nodes {
                if !state.is_settled(&node.id) {
                    state.results.insert(
                        node.id.clone(),
                        NodeExecutionResult::failure(
                            &node.id,
                            NodeStatus::Cancelled,
                            "never started: execution halted",
                            Utc::now(),
                            0,
                        ),
                    );
                }
            }
        }

        let end = Utc::now();
        let current_status = self
            .store
            .get_state(execution_id)
            .map(|s| s.status)
            .unwrap_or(ExecutionStatus::Running);
        let final_status = if timed_out {
            ExecutionStatus::Timeout
        } else if current_status == ExecutionStatus::Cancelled {
            ExecutionStatus::Cancelled
        } else if state.failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        if current_status != final_status {
            if let Err(err) = self.store.update_execution_status(execution_id, final_status) {
                warn!(%err, "could not finalize execution status");
            }
        }

        let metrics =
            ExecutionMetrics::from_results(&state.results, start, end, config.max_concurrency);
        let error = if timed_out {
            let timeout_ms = config.timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
            Some(ExecutionErrorInfo::new(
                GRAPH_EXECUTION_TIMEOUT,
                format!("execution exceeded the global timeout of {timeout_ms}ms"),
                serde_json::json!({ "timeout_ms": timeout_ms }),
            ))
        } else if final_status == ExecutionStatus::Cancelled {
            Some(ExecutionErrorInfo::new(
                "EXECUTION_CANCELLED",
                "execution was cancelled before all nodes settled",
                Value::Null,
            ))
        } else if state.failed {
            let failed: Vec<&str> = state
                .results
                .iter()
                .filter(|(_, r)| r.status == NodeStatus::Failed || r.status == NodeStatus::Timeout)
                .map(|(id, _)| id.as_str())
                .collect();
            Some(ExecutionErrorInfo::new(
                "NODE_EXECUTION_FAILED",
                format!("{} node(s) failed", failed.len()),
                serde_json::json!({ "failed_nodes": failed }),
            ))
        } else {
            None
        };
        let success = final_status == ExecutionStatus::Completed && error.is_none();

        if let Ok(metrics_json) = serde_json::to_value(&metrics) {
            self.emit(Event::Metrics {
                execution_id: execution_id.to_string(),
                metrics: metrics_json,
            });
        }
        self.emit(Event::ExecutionCompleted {
            execution_id: execution_id.to_string(),
            status: final_status,
        });
        debug!(execution_id, status = %final_status, "execution finished");

        Ok(ExecutionResult {
            success,
            results: state.results,
            execution: ExecutionSummary {
                execution_id: execution_id.to_string(),
                status: final_status,
                start_time: start,
                end_time: end,
                strategy: config.strategy,
            },
            metrics,
            error,
        })
    }

    /// Settle any node the dropped dispatch future left `executing`, then
    /// rebuild the working set from the store.
    fn recover_after_timeout(&self, execution_id: &str) -> DispatchState {
        if let Some(snapshot) = self.store.get_state(execution_id) {
            for node_id in snapshot.executing {
                let result = NodeExecutionResult::failure(
                    &node_id,
                    NodeStatus::Timeout,
                    "aborted by global execution timeout",
                    Utc::now(),
                    0,
                );
                if let Err(err) = self.store.fail_node(execution_id, &node_id, result) {
                    warn!(%err, node_id, "could not settle node after timeout");
                }
            }
        }
        let mut state = DispatchState {
            failed: true,
            halted: true,
            ..DispatchState::default()
        };
        if let Some(snapshot) = self.store.get_state(execution_id) {
            state.completed = snapshot.completed.clone();
            state.results = snapshot.node_results;
        }
        state
    }

    async fn dispatch(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        config: &ExecutionConfig,
        context: &Value,
        root_input: &Value,
    ) -> Result<DispatchState, SchedulerError> {
        let initial = self
            .store
            .get_state(execution_id)
            .ok_or_else(|| StateError::UnknownExecution {
                execution_id: execution_id.to_string(),
            })?;
        let mut state = DispatchState {
            results: initial.node_results.clone(),
            completed: initial.completed.clone(),
            ..DispatchState::default()
        };
        // Nodes already failed (e.g. before a restore) count as failures in
        // this run's result too.
        state.failed = !initial.failed.is_empty();

        use crate::scheduler::config::Strategy;
        match config.strategy {
            Strategy::Sequential => {
                self.run_levels_inline(execution_id, graph, config, context, root_input, &mut state)
                    .await?;
            }
            Strategy::Parallel => {
                for level in &graph.execution_plan {
                    let pending: Vec<NodeId> = level
                        .iter()
                        .filter(|id| !state.is_settled(id))
                        .cloned()
                        .collect();
                    if pending.is_empty() {
                        continue;
                    }
                    let halted = self
                        .run_pool(
                            execution_id, graph, config, context, root_input, &mut state, pending,
                            false,
                        )
                        .await?;
                    if halted {
                        break;
                    }
                }
            }
            Strategy::Hybrid => {
                for level in &graph.execution_plan {
                    let pending: Vec<NodeId> = level
                        .iter()
                        .filter(|id| !state.is_settled(id))
                        .cloned()
                        .collect();
                    let halted = match pending.len() {
                        0 => false,
                        // Single-node levels skip the task-spawn machinery.
                        1 => {
                            self.run_single(
                                execution_id,
                                graph,
                                config,
                                context,
                                root_input,
                                &mut state,
                                &pending[0],
                            )
                            .await?
                        }
                        _ => {
                            self.run_pool(
                                execution_id, graph, config, context, root_input, &mut state,
                                pending, false,
                            )
                            .await?
                        }
                    };
                    if halted {
                        break;
                    }
                }
            }
            Strategy::Adaptive => {
                let ready = self.ready_nodes(graph, &state, &FxHashSet::default());
                self.run_pool(
                    execution_id, graph, config, context, root_input, &mut state, ready, true,
                )
                .await?;
            }
        }
        Ok(state)
    }

    /// Sequential strategy: every node inline, level order then definition
    /// order.
    async fn run_levels_inline(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        config: &ExecutionConfig,
        context: &Value,
        root_input: &Value,
        state: &mut DispatchState,
    ) -> Result<bool, SchedulerError> {
        for level in &graph.execution_plan {
            for node_id in level {
                if state.is_settled(node_id) {
                    continue;
                }
                if self
                    .run_single(execution_id, graph, config, context, root_input, state, node_id)
                    .await?
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Run one node on the current task. Returns `true` when dispatch must
    /// halt.
    #[allow(clippy::too_many_arguments)]
    async fn run_single(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        config: &ExecutionConfig,
        context: &Value,
        root_input: &Value,
        state: &mut DispatchState,
        node_id: &str,
    ) -> Result<bool, SchedulerError> {
        if matches!(self.execution_gate(execution_id).await, Gate::Cancelled) {
            state.halted = true;
            return Ok(true);
        }
        let (node, executor) = self.lookup(graph, node_id)?;
        let input = self.resolve_input(execution_id, graph, node_id, root_input);
        let timeout = node
            .timeout_ms()
            .map(Duration::from_millis)
            .or(config.node_timeout);
        let result = run_node(
            Arc::clone(&self.store),
            executor,
            execution_id.to_string(),
            node,
            input,
            config.retry_policy.clone(),
            timeout,
            context.clone(),
            config.resource_limits,
        )
        .await?;
        let halt = self
            .settle(execution_id, graph, config, context, state, result)
            .await;
        if halt {
            state.halted = true;
        }
        Ok(halt)
    }

    /// Concurrent pool over a work queue. With `adaptive` set, the queue is
    /// refilled with any node whose dependencies complete, regardless of
    /// level.
    #[allow(clippy::too_many_arguments)]
    async fn run_pool(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        config: &ExecutionConfig,
        context: &Value,
        root_input: &Value,
        state: &mut DispatchState,
        initial: Vec<NodeId>,
        adaptive: bool,
    ) -> Result<bool, SchedulerError> {
        let mut queue: VecDeque<NodeId> = initial.into();
        let mut in_flight: FxHashSet<NodeId> = FxHashSet::default();
        let mut tasks: JoinSet<Result<NodeExecutionResult, StateError>> = JoinSet::new();
        let mut cancelled = false;

        loop {
            while !cancelled && in_flight.len() < config.max_concurrency {
                let Some(node_id) = queue.pop_front() else { break };
                if state.is_settled(&node_id) || in_flight.contains(&node_id) {
                    continue;
                }
                if matches!(self.execution_gate(execution_id).await, Gate::Cancelled) {
                    cancelled = true;
                    break;
                }
                let (node, executor) = self.lookup(graph, &node_id)?;
                let input = self.resolve_input(execution_id, graph, &node_id, root_input);
                let timeout = node
                    .timeout_ms()
                    .map(Duration::from_millis)
                    .or(config.node_timeout);
                tasks.spawn(run_node(
                    Arc::clone(&self.store),
                    executor,
                    execution_id.to_string(),
                    node,
                    input,
                    config.retry_policy.clone(),
                    timeout,
                    context.clone(),
                    config.resource_limits,
                ));
                in_flight.insert(node_id);
            }

            if in_flight.is_empty() {
                break;
            }

            match tasks.join_next().await {
                Some(Ok(Ok(result))) => {
                    in_flight.remove(&result.node_id);
                    let completed_id =
                        (result.status == NodeStatus::Completed).then(|| result.node_id.clone());
                    let halt = self
                        .settle(execution_id, graph, config, context, state, result)
                        .await;
                    if halt {
                        self.halt_cleanup(execution_id, &mut tasks, state).await;
                        return Ok(true);
                    }
                    if adaptive {
                        if let Some(done) = completed_id {
                            for next in self.ready_after(graph, state, &in_flight, &queue, &done) {
                                queue.push_back(next);
                            }
                        }
                    }
                }
                Some(Ok(Err(state_err))) => {
                    tasks.abort_all();
                    return Err(state_err.into());
                }
                Some(Err(join_err)) => {
                    tasks.abort_all();
                    return Err(SchedulerError::NodePanic {
                        message: join_err.to_string(),
                    });
                }
                None => in_flight.clear(),
            }
        }

        if cancelled {
            state.halted = true;
        }
        Ok(cancelled)
    }

    fn lookup(
        &self,
        graph: &ExecutableGraph,
        node_id: &str,
    ) -> Result<(crate::definition::NodeSpec, Arc<dyn NodeExecutor>), SchedulerError> {
        let node = graph
            .definition
            .node(node_id)
            .cloned()
            .ok_or_else(|| SchedulerError::MissingExecutor {
                node_id: node_id.to_string(),
                node_type: "<unknown node>".to_string(),
            })?;
        let executor = self.registry.get(node.node_type.as_str()).ok_or_else(|| {
            SchedulerError::MissingExecutor {
                node_id: node_id.to_string(),
                node_type: node.node_type.as_str().to_string(),
            }
        })?;
        Ok((node, executor))
    }

    /// Nodes whose dependencies are all completed and which are not yet
    /// settled, queued, or in flight. Ordered by level, then definition
    /// order.
    fn ready_nodes(
        &self,
        graph: &ExecutableGraph,
        state: &DispatchState,
        in_flight: &FxHashSet<NodeId>,
    ) -> Vec<NodeId> {
        let mut ready: Vec<NodeId> = graph
            .definition
            .nodes
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| {
                !state.is_settled(id)
                    && !in_flight.contains(id)
                    && graph
                        .dependencies_of(id)
                        .iter()
                        .all(|dep| state.completed.contains(dep))
            })
            .collect();
        let def_index: FxHashMap<&str, usize> = graph
            .definition
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        ready.sort_by_key(|id| {
            (
                graph.execution_order.get(id).copied().unwrap_or(usize::MAX),
                def_index.get(id.as_str()).copied().unwrap_or(usize::MAX),
            )
        });
        ready
    }

    /// Under the adaptive strategy: dependents of `done` that just became
    /// ready.
    fn ready_after(
        &self,
        graph: &ExecutableGraph,
        state: &DispatchState,
        in_flight: &FxHashSet<NodeId>,
        queue: &VecDeque<NodeId>,
        done: &str,
    ) -> Vec<NodeId> {
        self.ready_nodes(graph, state, in_flight)
            .into_iter()
            .filter(|id| graph.dependents_of(done).contains(id) && !queue.contains(id))
            .collect()
    }

    /// Fold one settled result into the working set and apply the failure
    /// propagation strategy. Returns `true` when dispatch must halt.
    async fn settle(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        config: &ExecutionConfig,
        context: &Value,
        state: &mut DispatchState,
        result: NodeExecutionResult,
    ) -> bool {
        let node_id = result.node_id.clone();
        let succeeded = result.status == NodeStatus::Completed;
        state.results.insert(node_id.clone(), result);
        if succeeded {
            state.completed.insert(node_id.clone());
            state.completion_order.push(node_id);
            return false;
        }

        state.failed = true;
        match config.failure_propagation {
            FailurePropagation::FailFast => true,
            FailurePropagation::Continue => {
                for dependent in graph.transitive_dependents(&node_id) {
                    if state.is_settled(&dependent) {
                        continue;
                    }
                    debug!(node_id = %dependent, failed = %node_id, "skipping dependent");
                    state.results.insert(
                        dependent.clone(),
                        NodeExecutionResult::failure(
                            &dependent,
                            NodeStatus::Skipped,
                            format!("skipped: dependency '{node_id}' failed"),
                            Utc::now(),
                            0,
                        ),
                    );
                    state.skipped.insert(dependent);
                }
                false
            }
            FailurePropagation::Compensate => {
                self.compensate_ancestors(execution_id, graph, config, context, state, &node_id)
                    .await;
                true
            }
        }
    }

    /// Invoke compensation hooks for completed ancestors of `failed_id`, in
    /// reverse completion order. Hook failures are logged, never propagated.
    async fn compensate_ancestors(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        config: &ExecutionConfig,
        context: &Value,
        state: &DispatchState,
        failed_id: &str,
    ) {
        let mut ancestors = FxHashSet::default();
        let mut stack: Vec<NodeId> = graph.dependencies_of(failed_id).iter().cloned().collect();
        while let Some(next) = stack.pop() {
            if ancestors.insert(next.clone()) {
                stack.extend(graph.dependencies_of(&next).iter().cloned());
            }
        }
        for node_id in state.completion_order.iter().rev() {
            if !ancestors.contains(node_id) {
                continue;
            }
            let Some(result) = state.results.get(node_id) else {
                continue;
            };
            let Ok((node, executor)) = self.lookup(graph, node_id) else {
                continue;
            };
            let ctx = ExecutionContext {
                execution_id: execution_id.to_string(),
                node_id: node_id.clone(),
                attempt: 0,
                config: node.config.clone(),
                context: context.clone(),
                limits: config.resource_limits,
            };
            debug!(node_id = %node_id, "running compensation hook");
            if let Err(err) = executor.compensate(result.output.clone(), &ctx).await {
                warn!(node_id = %node_id, %err, "compensation hook failed");
                self.emit(Event::Diagnostic {
                    scope: "compensation".to_string(),
                    message: format!("hook for '{node_id}' failed: {err}"),
                });
            }
        }
    }

    /// Stop the pool after a fatal settlement: collect whatever already
    /// finished, then settle anything still `executing` as cancelled.
    async fn halt_cleanup(
        &self,
        execution_id: &str,
        tasks: &mut JoinSet<Result<NodeExecutionResult, StateError>>,
        state: &mut DispatchState,
    ) {
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Ok(result)) = joined {
                if result.status == NodeStatus::Completed {
                    state.completed.insert(result.node_id.clone());
                    state.completion_order.push(result.node_id.clone());
                }
                state.results.insert(result.node_id.clone(), result);
            }
        }
        if let Some(snapshot) = self.store.get_state(execution_id) {
            for node_id in snapshot.executing {
                let result = NodeExecutionResult::failure(
                    &node_id,
                    NodeStatus::Cancelled,
                    "cancelled by failure propagation",
                    Utc::now(),
                    0,
                );
                if self
                    .store
                    .fail_node(execution_id, &node_id, result.clone())
                    .is_ok()
                {
                    state.results.insert(node_id, result);
                }
            }
        }
        state.halted = true;
    }

    /// Block while the execution is paused; report cancellation.
    async fn execution_gate(&self, execution_id: &str) -> Gate {
        loop {
            match self.store.get_state(execution_id).map(|s| s.status) {
                Some(ExecutionStatus::Paused) => {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                Some(ExecutionStatus::Cancelled) => return Gate::Cancelled,
                _ => return Gate::Proceed,
            }
        }
    }

    /// Resolved input for a node: explicit input if set, otherwise the
    /// single dependency's output, otherwise an object of outputs keyed by
    /// dependency id. Entry points fall back to the execution-level input.
    fn resolve_input(
        &self,
        execution_id: &str,
        graph: &ExecutableGraph,
        node_id: &str,
        root_input: &Value,
    ) -> Value {
        if let Some(explicit) = self.store.get_node_input(execution_id, node_id) {
            return explicit;
        }
        let deps = graph.dependencies_of(node_id);
        if deps.is_empty() {
            return root_input.clone();
        }
        if deps.len() == 1 {
            if let Some(dep) = deps.iter().next() {
                return self
                    .store
                    .get_node_output(execution_id, dep)
                    .unwrap_or(Value::Null);
            }
        }
        let mut sorted: Vec<&NodeId> = deps.iter().collect();
        sorted.sort();
        let mut merged = serde_json::Map::new();
        for dep in sorted {
            merged.insert(
                dep.clone(),
                self.store
                    .get_node_output(execution_id, dep)
                    .unwrap_or(Value::Null),
            );
        }
        Value::Object(merged)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .finish()
    }
}

/// One node's full lifecycle: admission, attempts with backoff, settlement.
///
/// The store's `start_node` is the authoritative admission check; retries
/// happen while the node stays `executing`, so the disjoint-set invariant
/// holds across attempts.
#[allow(clippy::too_many_arguments)]
async fn run_node(
    store: Arc<StateStore>,
    executor: Arc<dyn NodeExecutor>,
    execution_id: String,
    node: crate::definition::NodeSpec,
    input: Value,
    policy: RetryPolicy,
    node_timeout: Option<Duration>,
    context: Value,
    limits: ResourceLimits,
) -> Result<NodeExecutionResult, StateError> {
    store.start_node(&execution_id, &node.id, input.clone())?;
    let started = Utc::now();
    let mut attempt: u32 = 0;
    loop {
        let ctx = ExecutionContext {
            execution_id: execution_id.clone(),
            node_id: node.id.clone(),
            attempt,
            config: node.config.clone(),
            context: context.clone(),
            limits,
        };
        let invocation = executor.execute(input.clone(), &ctx);
        let outcome = match node_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
                Ok(settled) => settled,
                Err(_) => {
                    let result = NodeExecutionResult::failure(
                        &node.id,
                        NodeStatus::Timeout,
                        format!("node timed out after {}ms", deadline.as_millis()),
                        started,
                        attempt,
                    );
                    store.fail_node(&execution_id, &node.id, result.clone())?;
                    return Ok(result);
                }
            },
            None => invocation.await,
        };
        match outcome {
            Ok(output) => {
                let result = NodeExecutionResult::success(&node.id, output, started, attempt);
                store.complete_node(&execution_id, &node.id, result.clone())?;
                return Ok(result);
            }
            Err(err) => {
                if policy.is_retryable(err.kind()) && attempt + 1 < policy.max_attempts {
                    attempt += 1;
                    debug!(node_id = %node.id, attempt, "retrying after backoff");
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                    continue;
                }
                let result = NodeExecutionResult::failure(
                    &node.id,
                    NodeStatus::Failed,
                    err.to_string(),
                    started,
                    attempt,
                );
                store.fail_node(&execution_id, &node.id, result.clone())?;
                return Ok(result);
            }
        }
    }
}
