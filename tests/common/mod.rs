//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use gridflow::definition::GraphDefinition;
use gridflow::executor::{ExecutionContext, ExecutorRegistry, NodeError, NodeExecutor};
use gridflow::types::{EdgeType, NodeType};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Echoes its input and records the order nodes were invoked in.
pub struct RecordingExecutor {
    order: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let order = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                order: Arc::clone(&order),
            },
            order,
        )
    }
}

#[async_trait]
impl NodeExecutor for RecordingExecutor {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.order.lock().push(ctx.node_id.clone());
        Ok(input)
    }
}

/// Tracks the peak number of concurrently running invocations.
pub struct ConcurrencyProbe {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    hold_ms: u64,
}

impl ConcurrencyProbe {
    pub fn new(hold_ms: u64) -> (Self, Arc<AtomicUsize>) {
        let peak = Arc::new(AtomicUsize::new(0));
        (
            Self {
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&peak),
                hold_ms,
            },
            peak,
        )
    }
}

#[async_trait]
impl NodeExecutor for ConcurrencyProbe {
    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(self.hold_ms)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(input)
    }
}

/// Fails every attempt with a retryable error; counts invocations.
pub struct AlwaysTransient {
    pub calls: Arc<AtomicU32>,
}

impl AlwaysTransient {
    pub fn new() -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl NodeExecutor for AlwaysTransient {
    async fn execute(&self, _input: Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NodeError::Transient("induced".into()))
    }
}

/// Records which node outputs were compensated, in order.
pub struct CompensationRecorder {
    pub compensated: Arc<Mutex<Vec<String>>>,
    pub fail_node: String,
}

#[async_trait]
impl NodeExecutor for CompensationRecorder {
    async fn execute(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        if ctx.node_id == self.fail_node {
            return Err(NodeError::ValidationFailed("induced".into()));
        }
        Ok(input)
    }

    async fn compensate(&self, _output: Value, ctx: &ExecutionContext) -> Result<(), NodeError> {
        self.compensated.lock().push(ctx.node_id.clone());
        Ok(())
    }
}

/// `a -> b -> c -> d` pipeline of transform nodes.
pub fn chain4() -> GraphDefinition {
    GraphDefinition::builder("chain4")
        .add_node("a", NodeType::Transform)
        .add_node("b", NodeType::Transform)
        .add_node("c", NodeType::Transform)
        .add_node("d", NodeType::Transform)
        .add_edge("a", "b", EdgeType::Data)
        .add_edge("b", "c", EdgeType::Data)
        .add_edge("c", "d", EdgeType::Data)
        .with_output_node("d")
        .build()
}

/// One source fanning out to `width` independent sinks.
pub fn fan_out(width: usize) -> GraphDefinition {
    let mut builder = GraphDefinition::builder("fan")
        .add_node("src", NodeType::Input);
    for i in 0..width {
        let id = format!("leaf{i}");
        builder = builder
            .add_node(&id, NodeType::Transform)
            .add_edge("src", &id, EdgeType::Data)
            .with_output_node(&id);
    }
    builder.build()
}

pub fn registry_with(node_type: &str, executor: impl NodeExecutor + 'static) -> ExecutorRegistry {
    ExecutorRegistry::new().with_executor(node_type, executor)
}
