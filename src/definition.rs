//! Declarative workflow graph definitions.
//!
//! A [`GraphDefinition`] is the immutable input to the
//! [compiler](crate::compiler): an ordered list of typed nodes, an ordered
//! list of directed edges, and graph-level metadata. Definitions say nothing
//! about *how* nodes execute; behavior is bound later through an
//! [`ExecutorRegistry`](crate::executor::ExecutorRegistry).
//!
//! # Examples
//!
//! ```rust
//! use gridflow::definition::GraphDefinition;
//! use gridflow::types::{EdgeType, NodeType};
//! use serde_json::json;
//!
//! let def = GraphDefinition::builder("etl")
//!     .add_node("extract", NodeType::Input)
//!     .add_node_with_config("transform", NodeType::Transform, json!({"mode": "strict"}))
//!     .add_node("load", NodeType::ToolCall)
//!     .add_edge("extract", "transform", EdgeType::Data)
//!     .add_edge("transform", "load", EdgeType::Data)
//!     .build();
//!
//! assert_eq!(def.nodes.len(), 3);
//! assert_eq!(def.edges.len(), 2);
//! ```

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{EdgeType, GraphId, NodeId, NodeType};

/// A single node in a graph definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique id within the graph.
    pub id: NodeId,
    /// Type tag used for executor lookup.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Opaque configuration forwarded to the executor. The engine reads only
    /// the optional `timeout_ms` key (per-node deadline).
    #[serde(default)]
    pub config: Value,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            config: Value::Null,
        }
    }

    /// Per-node timeout in milliseconds, if the node config declares one.
    #[must_use]
    pub fn timeout_ms(&self) -> Option<u64> {
        self.config.get("timeout_ms").and_then(Value::as_u64)
    }
}

/// A directed edge between two nodes of a graph definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Unique id within the graph.
    pub id: String,
    /// Source node id.
    pub from: NodeId,
    /// Target node id.
    pub to: NodeId,
    /// Data-flow vs. gating semantics.
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Optional condition expression for [`EdgeType::Conditional`] edges.
    /// Opaque to the engine; evaluated by caller-supplied node logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Structural limits enforced during validation.
///
/// A definition exceeding either bound fails `build` with a limit error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLimits {
    pub max_nodes: usize,
    pub max_edges: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_nodes: 1_000,
            max_edges: 5_000,
        }
    }
}

/// Graph-level metadata: free-form tags, structural limits, and the set of
/// node ids designated as outputs (exempt from dead-end warnings).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limits: Option<GraphLimits>,
    #[serde(default)]
    pub output_nodes: Vec<NodeId>,
}

/// Immutable, declarative definition of a workflow graph.
///
/// Node order is significant: within an execution-plan level, nodes are
/// offered for dispatch in definition order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub id: GraphId,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub metadata: GraphMetadata,
}

impl GraphDefinition {
    /// Start a fluent builder for a graph with the given id.
    pub fn builder(id: impl Into<GraphId>) -> DefinitionBuilder {
        DefinitionBuilder::new(id)
    }

    /// Look up a node spec by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All node ids, in definition order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Whether `id` is designated as an output node in the metadata.
    #[must_use]
    pub fn is_output_node(&self, id: &str) -> bool {
        self.metadata.output_nodes.iter().any(|n| n == id)
    }

    /// Structural limits, falling back to [`GraphLimits::default`].
    #[must_use]
    pub fn limits(&self) -> GraphLimits {
        self.metadata.limits.unwrap_or_default()
    }
}

/// Fluent builder for [`GraphDefinition`].
///
/// Edge ids are generated as `e<N>` in insertion order unless supplied
/// explicitly via [`add_edge_spec`](Self::add_edge_spec).
#[derive(Debug)]
pub struct DefinitionBuilder {
    id: GraphId,
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
    metadata: GraphMetadata,
    seen_node_ids: FxHashSet<NodeId>,
}

impl DefinitionBuilder {
    fn new(id: impl Into<GraphId>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            metadata: GraphMetadata::default(),
            seen_node_ids: FxHashSet::default(),
        }
    }

    /// Add a node with no configuration.
    ///
    /// Re-registering an id is ignored with a warning; duplicate ids are a
    /// validation error when constructed without the builder.
    #[must_use]
    pub fn add_node(self, id: impl Into<NodeId>, node_type: NodeType) -> Self {
        self.add_node_with_config(id, node_type, Value::Null)
    }

    /// Add a node with executor configuration.
    #[must_use]
    pub fn add_node_with_config(
        mut self,
        id: impl Into<NodeId>,
        node_type: NodeType,
        config: Value,
    ) -> Self {
        let id = id.into();
        if !self.seen_node_ids.insert(id.clone()) {
            tracing::warn!(node = %id, "ignoring duplicate node registration");
            return self;
        }
        self.nodes.push(NodeSpec {
            id,
            node_type,
            config,
        });
        self
    }

    /// Add a directed edge between two previously named nodes.
    #[must_use]
    pub fn add_edge(
        mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        edge_type: EdgeType,
    ) -> Self {
        let id = format!("e{}", self.edges.len());
        self.edges.push(EdgeSpec {
            id,
            from: from.into(),
            to: to.into(),
            edge_type,
            condition: None,
        });
        self
    }

    /// Add a conditional edge with a gating expression.
    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        condition: impl Into<String>,
    ) -> Self {
        let id = format!("e{}", self.edges.len());
        self.edges.push(EdgeSpec {
            id,
            from: from.into(),
            to: to.into(),
            edge_type: EdgeType::Conditional,
            condition: Some(condition.into()),
        });
        self
    }

    /// Add a fully specified edge (explicit id and condition).
    #[must_use]
    pub fn add_edge_spec(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    /// Attach a free-form tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    /// Override the default structural limits.
    #[must_use]
    pub fn with_limits(mut self, limits: GraphLimits) -> Self {
        self.metadata.limits = Some(limits);
        self
    }

    /// Designate a node as an output (exempt from dead-end warnings).
    #[must_use]
    pub fn with_output_node(mut self, id: impl Into<NodeId>) -> Self {
        self.metadata.output_nodes.push(id.into());
        self
    }

    /// Finalize the definition.
    #[must_use]
    pub fn build(self) -> GraphDefinition {
        GraphDefinition {
            id: self.id,
            nodes: self.nodes,
            edges: self.edges,
            metadata: self.metadata,
        }
    }
}
