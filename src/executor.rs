//! Node execution framework.
//!
//! The engine treats node behavior as an opaque async operation: callers
//! implement [`NodeExecutor`] per node type and hand the engine an explicit
//! [`ExecutorRegistry`] mapping type tags to implementations. There is no
//! process-wide registry; the mapping is constructed by the caller and passed
//! in at scheduler construction time.
//!
//! # Error Handling
//!
//! Executors report failure through [`NodeError`]. The scheduler consults
//! [`NodeError::kind`] against the retry policy's `retryable_errors` list to
//! decide whether a failed attempt is re-admitted.
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use gridflow::executor::{ExecutionContext, ExecutorRegistry, NodeError, NodeExecutor};
//! use serde_json::{json, Value};
//!
//! struct Doubler;
//!
//! #[async_trait]
//! impl NodeExecutor for Doubler {
//!     async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
//!         let n = input.as_i64().ok_or(NodeError::MissingInput { what: "number" })?;
//!         Ok(json!(n * 2))
//!     }
//! }
//!
//! let registry = ExecutorRegistry::new().with_executor("transform", Doubler);
//! assert!(registry.get("transform").is_some());
//! ```

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::types::{ExecutionId, NodeId};

/// Advisory per-execution resource ceilings, surfaced to node logic.
///
/// The engine does not meter caller-supplied logic; limits are passed
/// through so executors that can account for their own usage may honor
/// them.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceLimits {
    pub max_memory_bytes: Option<u64>,
    pub max_cpu_ms: Option<u64>,
    pub max_disk_bytes: Option<u64>,
    pub max_network_bytes: Option<u64>,
}

/// Ambient information handed to an executor for one node attempt.
///
/// The context is read-only from the executor's point of view; all state
/// mutation goes through the scheduler and state store.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// The execution this attempt belongs to.
    pub execution_id: ExecutionId,
    /// The node being executed.
    pub node_id: NodeId,
    /// Zero-based attempt counter (0 on the first try).
    pub attempt: u32,
    /// Node configuration from the graph definition.
    pub config: Value,
    /// Caller-supplied session/user metadata, immutable for the execution.
    pub context: Value,
    /// Resource ceilings configured for the execution.
    pub limits: ResourceLimits,
}

/// Errors produced by caller-supplied node logic.
///
/// These never abort the overall `execute` call; the scheduler absorbs them
/// into retry handling and, once attempts are exhausted, into the final
/// result as a failed node.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data was absent.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(gridflow::executor::missing_input),
        help("Check that upstream nodes produce the required data.")
    )]
    MissingInput { what: &'static str },

    /// A downstream provider or service failed.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(gridflow::executor::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// Input failed executor-side validation.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(gridflow::executor::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// JSON (de)serialization failure inside node logic.
    #[error(transparent)]
    #[diagnostic(code(gridflow::executor::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Transient failure worth retrying (network hiccup, rate limit).
    #[error("transient failure: {0}")]
    #[diagnostic(code(gridflow::executor::transient))]
    Transient(String),

    /// Free-form failure from caller logic.
    #[error("{kind}: {message}")]
    #[diagnostic(code(gridflow::executor::other))]
    Other { kind: String, message: String },
}

impl NodeError {
    /// Stable kind string matched against a retry policy's
    /// `retryable_errors` list.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            NodeError::MissingInput { .. } => "missing_input",
            NodeError::Provider { .. } => "provider",
            NodeError::ValidationFailed(_) => "validation",
            NodeError::Serde(_) => "serde",
            NodeError::Transient(_) => "transient",
            NodeError::Other { kind, .. } => kind,
        }
    }
}

/// Capability interface for executing one node type.
///
/// Implementations must be stateless with respect to the engine: any state
/// they need flows in through `input`, `ctx.config`, and `ctx.context`.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute the node with its resolved input, producing an output value.
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError>;

    /// Undo side effects of a previously successful execution.
    ///
    /// Invoked by the scheduler under the `compensate` failure-propagation
    /// strategy, in reverse completion order. The default is a no-op.
    async fn compensate(&self, _output: Value, _ctx: &ExecutionContext) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Explicit mapping from node-type tag to executor implementation.
///
/// Constructed by the caller and shared immutably with the scheduler.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: FxHashMap<String, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            executors: FxHashMap::default(),
        }
    }

    /// Register an executor for a node-type tag, replacing any previous one.
    #[must_use]
    pub fn with_executor(
        mut self,
        node_type: impl Into<String>,
        executor: impl NodeExecutor + 'static,
    ) -> Self {
        self.executors.insert(node_type.into(), Arc::new(executor));
        self
    }

    /// Register an already-shared executor.
    #[must_use]
    pub fn with_shared_executor(
        mut self,
        node_type: impl Into<String>,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        self.executors.insert(node_type.into(), executor);
        self
    }

    /// Look up the executor registered for a type tag.
    #[must_use]
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).cloned()
    }

    /// Registered type tags, unordered.
    pub fn node_types(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("node_types", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Executor that returns its input unchanged. Useful for `input`/`merge`
/// nodes and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughExecutor;

#[async_trait]
impl NodeExecutor for PassthroughExecutor {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        Ok(input)
    }
}

/// Executor that sleeps for `delay_ms` from node config, then passes its
/// input through. Backs the `delay` node type.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelayExecutor;

#[async_trait]
impl NodeExecutor for DelayExecutor {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let ms = ctx
            .config
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            execution_id: "exec".into(),
            node_id: "n".into(),
            attempt: 0,
            config: Value::Null,
            context: Value::Null,
            limits: ResourceLimits::default(),
        }
    }

    #[tokio::test]
    async fn passthrough_echoes_input() {
        let out = PassthroughExecutor
            .execute(json!({"k": 1}), &ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({"k": 1}));
    }

    #[tokio::test]
    async fn default_compensate_is_noop() {
        PassthroughExecutor
            .compensate(json!(null), &ctx())
            .await
            .unwrap();
    }

    #[test]
    fn registry_lookup_and_replacement() {
        let registry = ExecutorRegistry::new()
            .with_executor("transform", PassthroughExecutor)
            .with_executor("transform", DelayExecutor);
        assert!(registry.get("transform").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(NodeError::Transient("x".into()).kind(), "transient");
        assert_eq!(
            NodeError::Other {
                kind: "rate_limit".into(),
                message: "slow down".into()
            }
            .kind(),
            "rate_limit"
        );
    }
}
