//! Graph compilation: from declarative definition to executable plan.
//!
//! The compiler is the first of the engine's three subsystems. It consumes a
//! [`GraphDefinition`](crate::definition::GraphDefinition) and either reports
//! a full diagnostic picture ([`GraphCompiler::validate`]) or produces an
//! [`ExecutableGraph`] ready for the
//! [scheduler](crate::scheduler) ([`GraphCompiler::build`]).
//!
//! # Algorithm
//!
//! - adjacency maps built from the edge list (dangling references reported,
//!   not followed)
//! - cycle detection via tri-color DFS, reporting each full cycle path
//! - topological levels via Kahn's algorithm in waves, which doubles as the
//!   parallel-execution grouping: a node's level is the length of its longest
//!   dependency chain
//! - reachability from entry points (warning, or error in `strict` mode) and
//!   dead-end detection (warning unless designated output)
//!
//! # Examples
//!
//! ```rust
//! use gridflow::compiler::GraphCompiler;
//! use gridflow::definition::GraphDefinition;
//! use gridflow::types::{EdgeType, NodeType};
//!
//! let def = GraphDefinition::builder("linear")
//!     .add_node("input", NodeType::Input)
//!     .add_node("transform", NodeType::Transform)
//!     .add_node("output", NodeType::Transform)
//!     .add_edge("input", "transform", EdgeType::Data)
//!     .add_edge("transform", "output", EdgeType::Data)
//!     .with_output_node("output")
//!     .build();
//!
//! let compiler = GraphCompiler::default();
//! let report = compiler.validate(&def);
//! assert!(report.valid);
//!
//! let graph = compiler.build(&def).unwrap();
//! assert_eq!(graph.execution_plan.len(), 3);
//! assert_eq!(graph.entry_points, vec!["input".to_string()]);
//! ```

mod plan;
mod validation;

pub use plan::ExecutableGraph;
pub use validation::{
    CompilerOptions, GraphCompiler, GraphValidationError, ValidationIssue, ValidationMetadata,
    ValidationResult,
};
