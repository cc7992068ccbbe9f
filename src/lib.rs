//! # Gridflow
//!
//! A workflow execution engine for directed graphs of typed nodes. Graphs
//! are declared as data ([`definition::GraphDefinition`]), compiled into a
//! validated plan ([`compiler::ExecutableGraph`]), executed under a chosen
//! concurrency strategy ([`scheduler::Scheduler`]), and tracked in a
//! checkpointed state store ([`store::StateStore`]) that supports
//! restore-from-checkpoint.
//!
//! ## Module Guide
//!
//! - [`types`]: shared id aliases and the node/execution status machines.
//! - [`definition`]: declarative graph model and its fluent builder.
//! - [`compiler`]: validation (cycles, reachability, limits) and plan
//!   construction (topological levels, entry/exit points).
//! - [`executor`]: the [`executor::NodeExecutor`] capability trait and the
//!   explicit type-tag registry; node behavior is always caller-supplied.
//! - [`store`]: per-execution state with disjoint node sets, projections
//!   (progress, performance), and FIFO-retained checkpoints.
//! - [`scheduler`]: dispatch strategies, retry with backoff, per-node and
//!   global timeouts, failure propagation.
//! - [`event_bus`]: typed events for every transition, fanned out to
//!   pluggable sinks.
//! - [`telemetry`]: human-oriented event rendering for the stdout sink.
//! - [`runtime`]: the [`runtime::WorkflowEngine`] façade wiring it all
//!   together behind `execute`/`execute_stream`.
//!
//! ## Quick Start
//!
//! ```rust
//! use gridflow::definition::GraphDefinition;
//! use gridflow::executor::{ExecutorRegistry, PassthroughExecutor};
//! use gridflow::runtime::{EngineConfig, WorkflowEngine};
//! use gridflow::scheduler::ExecutionConfig;
//! use gridflow::types::{EdgeType, NodeType};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> miette::Result<()> {
//! let def = GraphDefinition::builder("etl")
//!     .add_node("extract", NodeType::Input)
//!     .add_node("transform", NodeType::Transform)
//!     .add_edge("extract", "transform", EdgeType::Data)
//!     .with_output_node("transform")
//!     .build();
//!
//! let registry = ExecutorRegistry::new()
//!     .with_executor("input", PassthroughExecutor)
//!     .with_executor("transform", PassthroughExecutor);
//!
//! let engine = WorkflowEngine::with_sinks(EngineConfig::default(), registry, vec![])?;
//! let result = engine
//!     .execute(&def, json!({"rows": [1, 2]}), &ExecutionConfig::default(), json!({}))
//!     .await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod definition;
pub mod event_bus;
pub mod executor;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod types;
