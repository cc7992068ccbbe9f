//! Executable graph representation produced by compilation.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::definition::GraphDefinition;
use crate::types::NodeId;

/// A validated, schedulable form of a [`GraphDefinition`].
///
/// Owned solely by the compiler's output and consumed read-only thereafter:
/// the scheduler shares it across all concurrent node tasks of an execution
/// without further synchronization.
///
/// Invariant: the underlying graph is acyclic, and a node's level in
/// [`execution_plan`](Self::execution_plan) equals the length of the longest
/// dependency chain ending at that node. Nodes share a level only if
/// mutually independent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutableGraph {
    /// The definition this plan was compiled from.
    pub definition: GraphDefinition,
    /// Direct dependencies per node (sources of incoming edges).
    pub dependencies: FxHashMap<NodeId, FxHashSet<NodeId>>,
    /// Direct dependents per node (targets of outgoing edges).
    pub dependents: FxHashMap<NodeId, FxHashSet<NodeId>>,
    /// Topological level index per node.
    pub execution_order: FxHashMap<NodeId, usize>,
    /// Nodes with no incoming data/control edge.
    pub entry_points: Vec<NodeId>,
    /// Nodes with no outgoing edge.
    pub exit_points: Vec<NodeId>,
    /// Ordered levels; each level's nodes have all dependencies satisfied by
    /// prior levels. Within a level, nodes appear in definition order.
    pub execution_plan: Vec<Vec<NodeId>>,
}

impl ExecutableGraph {
    /// Direct dependencies of `node`, empty when the node has none.
    #[must_use]
    pub fn dependencies_of(&self, node: &str) -> &FxHashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<FxHashSet<NodeId>> = std::sync::OnceLock::new();
        self.dependencies
            .get(node)
            .unwrap_or_else(|| EMPTY.get_or_init(FxHashSet::default))
    }

    /// Direct dependents of `node`, empty when the node has none.
    #[must_use]
    pub fn dependents_of(&self, node: &str) -> &FxHashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<FxHashSet<NodeId>> = std::sync::OnceLock::new();
        self.dependents
            .get(node)
            .unwrap_or_else(|| EMPTY.get_or_init(FxHashSet::default))
    }

    /// Every node that transitively depends on `node`.
    ///
    /// Used by the scheduler to mark downstream nodes as skipped when a
    /// dependency fails under the `continue` propagation strategy.
    #[must_use]
    pub fn transitive_dependents(&self, node: &str) -> FxHashSet<NodeId> {
        let mut out = FxHashSet::default();
        let mut stack: Vec<NodeId> = self.dependents_of(node).iter().cloned().collect();
        while let Some(next) = stack.pop() {
            if out.insert(next.clone()) {
                stack.extend(self.dependents_of(&next).iter().cloned());
            }
        }
        out
    }

    /// Total number of nodes in the plan.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.definition.nodes.len()
    }

    /// Number of levels in the execution plan.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.execution_plan.len()
    }
}
