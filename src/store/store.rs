//! Centralized, thread-safe execution-state store.

use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::event_bus::Event;
use crate::store::checkpoint::{Checkpoint, CheckpointFrequency, CheckpointPolicy};
use crate::store::state::{
    ExecutionProgress, ExecutionState, NodeExecutionResult, PerformanceMetrics, StepKind,
    INPUT_KEY_SUFFIX,
};
use crate::types::{ExecutionId, ExecutionStatus, NodeId, NodeStatus};

/// Errors surfaced by [`StateStore`] operations.
///
/// Every variant names the execution (and node, where relevant) so callers
/// can log or surface the failure without extra lookups.
#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    #[error("unknown execution '{execution_id}'")]
    #[diagnostic(
        code(gridflow::store::unknown_execution),
        help("Initialize the execution before operating on it, or check for a prior cleanup.")
    )]
    UnknownExecution { execution_id: ExecutionId },

    #[error("execution '{execution_id}' is already initialized")]
    #[diagnostic(code(gridflow::store::already_initialized))]
    AlreadyInitialized { execution_id: ExecutionId },

    #[error("node '{node_id}' is not part of execution '{execution_id}'")]
    #[diagnostic(code(gridflow::store::unknown_node))]
    UnknownNode {
        execution_id: ExecutionId,
        node_id: NodeId,
    },

    #[error(
        "node '{node_id}' in execution '{execution_id}' cannot {attempted} from state '{current_state}'"
    )]
    #[diagnostic(
        code(gridflow::store::invalid_node_transition),
        help("Node lifecycle is pending -> executing -> completed | failed; failed nodes re-enter via retry.")
    )]
    InvalidNodeTransition {
        execution_id: ExecutionId,
        node_id: NodeId,
        current_state: &'static str,
        attempted: &'static str,
    },

    #[error("execution '{execution_id}' cannot move from '{from}' to '{to}'")]
    #[diagnostic(code(gridflow::store::invalid_status_transition))]
    InvalidStatusTransition {
        execution_id: ExecutionId,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("checkpoint '{checkpoint_id}' not found for execution '{execution_id}'")]
    #[diagnostic(code(gridflow::store::unknown_checkpoint))]
    UnknownCheckpoint {
        execution_id: ExecutionId,
        checkpoint_id: String,
    },
}

struct ExecutionEntry {
    state: ExecutionState,
    checkpoints: Vec<Checkpoint>,
}

/// Thread-safe store of per-execution state, checkpoints, and projections.
///
/// Concurrency model: a read-locked outer map resolves the execution id to
/// an entry; each entry sits behind its own mutex, so mutations on one
/// execution are linearizable while distinct executions never contend.
///
/// Reads return owned deep copies; live state is never exposed by reference.
pub struct StateStore {
    entries: RwLock<FxHashMap<ExecutionId, Arc<Mutex<ExecutionEntry>>>>,
    policy: CheckpointPolicy,
    emitter: Mutex<Option<flume::Sender<Event>>>,
    timers: Mutex<FxHashMap<ExecutionId, JoinHandle<()>>>,
}

impl StateStore {
    #[must_use]
    pub fn new(policy: CheckpointPolicy) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            policy,
            emitter: Mutex::new(None),
            timers: Mutex::new(FxHashMap::default()),
        }
    }

    /// Attach an event channel; transitions are emitted to it from then on.
    #[must_use]
    pub fn with_emitter(self, sender: flume::Sender<Event>) -> Self {
        *self.emitter.lock() = Some(sender);
        self
    }

    /// The checkpoint policy this store was built with.
    #[must_use]
    pub fn policy(&self) -> &CheckpointPolicy {
        &self.policy
    }

    fn emit(&self, event: Event) {
        let guard = self.emitter.lock();
        if let Some(sender) = guard.as_ref() {
            if sender.send(event).is_err() {
                warn!("event channel closed; dropping event");
            }
        }
    }

    fn entry(&self, execution_id: &str) -> Result<Arc<Mutex<ExecutionEntry>>, StateError> {
        self.entries
            .read()
            .get(execution_id)
            .cloned()
            .ok_or_else(|| StateError::UnknownExecution {
                execution_id: execution_id.to_string(),
            })
    }

    /// Register a new execution with every node pending.
    ///
    /// When the policy enables time-based checkpointing, a background task
    /// is spawned that snapshots the execution on the configured interval
    /// until it reaches a terminal status or is cleaned up.
    #[instrument(skip(self, node_ids, context))]
    pub fn initialize(
        &self,
        execution_id: &str,
        graph_id: &str,
        node_ids: impl IntoIterator<Item = NodeId>,
        context: Value,
    ) -> Result<(), StateError> {
        let entry = {
            let mut entries = self.entries.write();
            if entries.contains_key(execution_id) {
                return Err(StateError::AlreadyInitialized {
                    execution_id: execution_id.to_string(),
                });
            }
            let state = ExecutionState::new(execution_id, graph_id, node_ids, context);
            let entry = Arc::new(Mutex::new(ExecutionEntry {
                state,
                checkpoints: Vec::new(),
            }));
            entries.insert(execution_id.to_string(), Arc::clone(&entry));
            entry
        };
        debug!(execution_id, graph_id, "execution initialized");
        self.emit(Event::Initialized {
            execution_id: execution_id.to_string(),
            graph_id: graph_id.to_string(),
        });
        if self.policy.enabled && self.policy.frequency == CheckpointFrequency::Time {
            self.spawn_time_checkpoints(execution_id.to_string(), entry);
        }
        Ok(())
    }

    /// Periodic checkpoint task over one entry. The task holds its own
    /// handle to the entry, so it never keeps the whole store alive; it
    /// stops on terminal status and is aborted by `cleanup`/`shutdown`.
    fn spawn_time_checkpoints(&self, execution_id: ExecutionId, entry: Arc<Mutex<ExecutionEntry>>) {
        let interval = self.policy.interval;
        let retention = self.policy.retention.max(1);
        let emitter = self.emitter.lock().clone();
        let id = execution_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if entry.lock().state.status.is_terminal() {
                    break;
                }
                let checkpoint = Self::capture_into(&entry, retention, None);
                debug!(
                    execution_id = %id,
                    checkpoint_id = %checkpoint.id,
                    "timed checkpoint created"
                );
                if let Some(sender) = &emitter {
                    let event = Event::CheckpointCreated {
                        execution_id: id.clone(),
                        checkpoint_id: checkpoint.id.clone(),
                        checkpoint: Box::new(checkpoint),
                    };
                    if sender.send(event).is_err() {
                        break;
                    }
                }
            }
        });
        if let Some(previous) = self.timers.lock().insert(execution_id, handle) {
            previous.abort();
        }
    }

    /// Snapshot an entry into its checkpoint list, evicting oldest-first
    /// past the retention limit.
    fn capture_into(
        entry: &Mutex<ExecutionEntry>,
        retention: usize,
        label: Option<String>,
    ) -> Checkpoint {
        let mut guard = entry.lock();
        let label =
            label.unwrap_or_else(|| format!("Auto-checkpoint {}", Utc::now().to_rfc3339()));
        let checkpoint = Checkpoint::capture(&guard.state, label);
        guard.checkpoints.push(checkpoint.clone());
        while guard.checkpoints.len() > retention {
            guard.checkpoints.remove(0);
        }
        checkpoint
    }

    fn node_set_of(state: &ExecutionState, node_id: &str) -> Option<&'static str> {
        if state.pending.contains(node_id) {
            Some("pending")
        } else if state.executing.contains(node_id) {
            Some("executing")
        } else if state.completed.contains(node_id) {
            Some("completed")
        } else if state.failed.contains(node_id) {
            Some("failed")
        } else {
            None
        }
    }

    fn require_in_set(
        state: &ExecutionState,
        node_id: &str,
        expected: &'static str,
        attempted: &'static str,
    ) -> Result<(), StateError> {
        match Self::node_set_of(state, node_id) {
            Some(current) if current == expected => Ok(()),
            Some(current) => Err(StateError::InvalidNodeTransition {
                execution_id: state.execution_id.clone(),
                node_id: node_id.to_string(),
                current_state: current,
                attempted,
            }),
            None => Err(StateError::UnknownNode {
                execution_id: state.execution_id.clone(),
                node_id: node_id.to_string(),
            }),
        }
    }

    /// Move a node from `pending` to `executing` and record the step.
    ///
    /// Returns the step index assigned to the start record.
    #[instrument(skip(self, input))]
    pub fn start_node(
        &self,
        execution_id: &str,
        node_id: &str,
        input: Value,
    ) -> Result<u64, StateError> {
        let entry = self.entry(execution_id)?;
        let step = {
            let mut guard = entry.lock();
            Self::require_in_set(&guard.state, node_id, "pending", "start")?;
            guard.state.pending.remove(node_id);
            guard.state.executing.insert(node_id.to_string());
            guard.state.current_time = Utc::now();
            guard.state.push_step(StepKind::NodeStart, node_id)
        };
        self.emit(Event::NodeStarted {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            step,
            input,
        });
        Ok(step)
    }

    /// Settle a node successfully: `executing` to `completed`, publish its
    /// output under the node id in the data map, record the step.
    ///
    /// Under node-frequency auto-checkpointing, a checkpoint labeled after
    /// the completed node is taken before returning.
    #[instrument(skip(self, result))]
    pub fn complete_node(
        &self,
        execution_id: &str,
        node_id: &str,
        result: NodeExecutionResult,
    ) -> Result<(), StateError> {
        let entry = self.entry(execution_id)?;
        let (step, result_for_event) = {
            let mut guard = entry.lock();
            Self::require_in_set(&guard.state, node_id, "executing", "complete")?;
            guard.state.executing.remove(node_id);
            guard.state.completed.insert(node_id.to_string());
            guard
                .state
                .data_state
                .insert(node_id.to_string(), result.output.clone());
            guard
                .state
                .node_results
                .insert(node_id.to_string(), result.clone());
            guard.state.current_time = Utc::now();
            let step = guard.state.push_step(StepKind::NodeComplete, node_id);
            (step, result)
        };
        self.emit(Event::NodeCompleted {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            step,
            result: result_for_event,
        });
        if self.policy.enabled && self.policy.frequency == CheckpointFrequency::Node {
            let label = format!(
                "Auto-checkpoint {}-after-{node_id}",
                Utc::now().to_rfc3339()
            );
            self.create_checkpoint(execution_id, Some(label))?;
        }
        Ok(())
    }

    /// Settle a node as failed: `executing` to `failed`, record the step.
    #[instrument(skip(self, result))]
    pub fn fail_node(
        &self,
        execution_id: &str,
        node_id: &str,
        result: NodeExecutionResult,
    ) -> Result<(), StateError> {
        let entry = self.entry(execution_id)?;
        let (step, error) = {
            let mut guard = entry.lock();
            Self::require_in_set(&guard.state, node_id, "executing", "fail")?;
            guard.state.executing.remove(node_id);
            guard.state.failed.insert(node_id.to_string());
            let error = result.error.clone().unwrap_or_default();
            guard
                .state
                .node_results
                .insert(node_id.to_string(), result);
            guard.state.current_time = Utc::now();
            let step = guard.state.push_step(StepKind::NodeError, node_id);
            (step, error)
        };
        self.emit(Event::NodeFailed {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            step,
            error,
        });
        Ok(())
    }

    /// Re-admit a failed node: `failed` back to `pending`, discarding its
    /// failed result so the next settlement writes a fresh one.
    #[instrument(skip(self))]
    pub fn retry_node(&self, execution_id: &str, node_id: &str) -> Result<(), StateError> {
        let entry = self.entry(execution_id)?;
        let mut guard = entry.lock();
        Self::require_in_set(&guard.state, node_id, "failed", "retry")?;
        guard.state.failed.remove(node_id);
        guard.state.pending.insert(node_id.to_string());
        guard.state.node_results.remove(node_id);
        guard.state.current_time = Utc::now();
        Ok(())
    }

    /// Attach explicit input data for a node under the `<node_id>_input` key.
    #[instrument(skip(self, data))]
    pub fn set_node_input(
        &self,
        execution_id: &str,
        node_id: &str,
        data: Value,
    ) -> Result<(), StateError> {
        let entry = self.entry(execution_id)?;
        {
            let mut guard = entry.lock();
            if Self::node_set_of(&guard.state, node_id).is_none() {
                return Err(StateError::UnknownNode {
                    execution_id: execution_id.to_string(),
                    node_id: node_id.to_string(),
                });
            }
            guard
                .state
                .data_state
                .insert(format!("{node_id}{INPUT_KEY_SUFFIX}"), data.clone());
            guard.state.current_time = Utc::now();
        }
        self.emit(Event::NodeInputSet {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            data,
        });
        Ok(())
    }

    /// Explicit input previously attached via [`set_node_input`](Self::set_node_input).
    #[must_use]
    pub fn get_node_input(&self, execution_id: &str, node_id: &str) -> Option<Value> {
        let entry = self.entry(execution_id).ok()?;
        let guard = entry.lock();
        guard
            .state
            .data_state
            .get(&format!("{node_id}{INPUT_KEY_SUFFIX}"))
            .cloned()
    }

    /// A completed node's published output.
    #[must_use]
    pub fn get_node_output(&self, execution_id: &str, node_id: &str) -> Option<Value> {
        let entry = self.entry(execution_id).ok()?;
        let guard = entry.lock();
        guard.state.data_state.get(node_id).cloned()
    }

    /// Advance the execution-level status machine.
    ///
    /// Rejects transitions the machine does not allow (for example
    /// `completed` to `running`).
    #[instrument(skip(self))]
    pub fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> Result<(), StateError> {
        let entry = self.entry(execution_id)?;
        let previous = {
            let mut guard = entry.lock();
            let from = guard.state.status;
            if !from.can_transition_to(status) {
                return Err(StateError::InvalidStatusTransition {
                    execution_id: execution_id.to_string(),
                    from,
                    to: status,
                });
            }
            guard.state.status = status;
            guard.state.current_time = Utc::now();
            from
        };
        self.emit(Event::StatusChanged {
            execution_id: execution_id.to_string(),
            previous_status: previous,
            new_status: status,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Take a checkpoint of the execution's current state.
    ///
    /// With no label, one is generated from the current timestamp. When the
    /// per-execution list exceeds the retention limit, the oldest
    /// checkpoint is discarded first.
    #[instrument(skip(self))]
    pub fn create_checkpoint(
        &self,
        execution_id: &str,
        label: Option<String>,
    ) -> Result<Checkpoint, StateError> {
        let entry = self.entry(execution_id)?;
        let checkpoint = Self::capture_into(&entry, self.policy.retention.max(1), label);
        debug!(
            execution_id,
            checkpoint_id = %checkpoint.id,
            "checkpoint created"
        );
        self.emit(Event::CheckpointCreated {
            execution_id: execution_id.to_string(),
            checkpoint_id: checkpoint.id.clone(),
            checkpoint: Box::new(checkpoint.clone()),
        });
        Ok(checkpoint)
    }

    /// Replace live state with a checkpoint's snapshot.
    ///
    /// The checkpoint list itself is untouched, so restoring does not lose
    /// later checkpoints.
    #[instrument(skip(self))]
    pub fn restore_from_checkpoint(
        &self,
        execution_id: &str,
        checkpoint_id: &str,
    ) -> Result<(), StateError> {
        let entry = self.entry(execution_id)?;
        {
            let mut guard = entry.lock();
            let snapshot = guard
                .checkpoints
                .iter()
                .find(|cp| cp.id == checkpoint_id)
                .map(|cp| cp.state.clone())
                .ok_or_else(|| StateError::UnknownCheckpoint {
                    execution_id: execution_id.to_string(),
                    checkpoint_id: checkpoint_id.to_string(),
                })?;
            guard.state = snapshot;
            guard.state.current_time = Utc::now();
        }
        self.emit(Event::StateRestored {
            execution_id: execution_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Deep copy of the execution's full state, `None` if unknown.
    #[must_use]
    pub fn get_state(&self, execution_id: &str) -> Option<ExecutionState> {
        let entry = self.entry(execution_id).ok()?;
        let guard = entry.lock();
        Some(guard.state.clone())
    }

    /// Progress projection, `None` if the execution is unknown.
    #[must_use]
    pub fn get_progress(&self, execution_id: &str) -> Option<ExecutionProgress> {
        let entry = self.entry(execution_id).ok()?;
        let guard = entry.lock();
        Some(guard.state.progress())
    }

    /// Performance projection, `None` if the execution is unknown.
    #[must_use]
    pub fn get_performance_metrics(&self, execution_id: &str) -> Option<PerformanceMetrics> {
        let entry = self.entry(execution_id).ok()?;
        let guard = entry.lock();
        Some(guard.state.performance_metrics())
    }

    /// Retained checkpoints, oldest first. `None` if the execution is
    /// unknown.
    #[must_use]
    pub fn get_checkpoints(&self, execution_id: &str) -> Option<Vec<Checkpoint>> {
        let entry = self.entry(execution_id).ok()?;
        let guard = entry.lock();
        Some(guard.checkpoints.clone())
    }

    /// Status of a single node, named after the set it currently occupies.
    #[must_use]
    pub fn node_status(&self, execution_id: &str, node_id: &str) -> Option<NodeStatus> {
        let entry = self.entry(execution_id).ok()?;
        let guard = entry.lock();
        match Self::node_set_of(&guard.state, node_id)? {
            "pending" => Some(NodeStatus::Pending),
            "executing" => Some(NodeStatus::Executing),
            "completed" => Some(NodeStatus::Completed),
            _ => Some(NodeStatus::Failed),
        }
    }

    /// Release all memory held for an execution, including its checkpoints,
    /// and stop its time-checkpoint task if one is running.
    #[instrument(skip(self))]
    pub fn cleanup(&self, execution_id: &str) -> Result<(), StateError> {
        let removed = self.entries.write().remove(execution_id);
        if removed.is_none() {
            return Err(StateError::UnknownExecution {
                execution_id: execution_id.to_string(),
            });
        }
        if let Some(timer) = self.timers.lock().remove(execution_id) {
            timer.abort();
        }
        self.emit(Event::CleanupCompleted {
            execution_id: execution_id.to_string(),
        });
        Ok(())
    }

    /// Drop all executions, stop all timers, and detach the event channel.
    pub fn shutdown(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
        self.entries.write().clear();
        *self.emitter.lock() = None;
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("executions", &self.entries.read().len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(CheckpointPolicy::default())
    }
}
