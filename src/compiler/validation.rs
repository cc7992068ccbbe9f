//! Structural validation and compilation of graph definitions.
//!
//! The compiler runs a single analysis pass over a [`GraphDefinition`] and
//! reports *all* discovered defects at once rather than stopping at the
//! first: cycles (with full paths), dangling edge references, limit
//! violations, unreachable nodes, and dead ends.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::plan::ExecutableGraph;
use crate::definition::GraphDefinition;
use crate::types::{EdgeType, NodeId};

/// One validation finding, fatal or advisory depending on which list of
/// [`ValidationResult`] it appears in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Stable machine-readable code (`cycle`, `missing_node`, ...).
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Offending node, when the finding is node-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Offending edge, when the finding is edge-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<String>,
}

impl ValidationIssue {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            node_id: None,
            edge_id: None,
        }
    }

    fn for_node(mut self, node: impl Into<NodeId>) -> Self {
        self.node_id = Some(node.into());
        self
    }

    fn for_edge(mut self, edge: impl Into<String>) -> Self {
        self.edge_id = Some(edge.into());
        self
    }
}

/// Structural statistics gathered during validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    /// Number of topological levels among the acyclic portion of the graph.
    pub max_depth: usize,
    /// Every detected cycle, as a closed node-id path (first id repeated
    /// at the end).
    pub cyclic_paths: Vec<Vec<NodeId>>,
    pub unreachable_nodes: Vec<NodeId>,
    pub dead_end_nodes: Vec<NodeId>,
}

/// Outcome of [`GraphCompiler::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
    pub metadata: ValidationMetadata,
}

/// Fatal compilation failure carrying every structural error found.
#[derive(Debug, Error, Diagnostic)]
#[error("graph '{graph_id}' failed validation: {summary}")]
#[diagnostic(
    code(gridflow::compiler::invalid_graph),
    help("Fix the listed structural errors in the graph definition and rebuild.")
)]
pub struct GraphValidationError {
    pub graph_id: String,
    pub summary: String,
    pub errors: Vec<ValidationIssue>,
}

impl GraphValidationError {
    fn from_result(graph_id: &str, errors: Vec<ValidationIssue>) -> Self {
        let summary = match errors.as_slice() {
            [] => "unknown error".to_string(),
            [only] => only.message.clone(),
            [first, rest @ ..] => format!("{} (+{} more)", first.message, rest.len()),
        };
        Self {
            graph_id: graph_id.to_string(),
            summary,
            errors,
        }
    }
}

/// Options controlling validation severity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Promote unreachable-node warnings to fatal errors.
    pub strict: bool,
}

/// Compiles declarative [`GraphDefinition`]s into [`ExecutableGraph`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphCompiler {
    options: CompilerOptions,
}

// Tri-color DFS marking. A back-edge into Gray proves a cycle.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Everything one analysis pass learns about a definition. Shared between
/// `validate` (which renders it into a [`ValidationResult`]) and `build`
/// (which renders it into an [`ExecutableGraph`]).
struct Analysis {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
    suggestions: Vec<String>,
    dependencies: FxHashMap<NodeId, FxHashSet<NodeId>>,
    dependents: FxHashMap<NodeId, FxHashSet<NodeId>>,
    levels: Vec<Vec<NodeId>>,
    entry_points: Vec<NodeId>,
    exit_points: Vec<NodeId>,
    cyclic_paths: Vec<Vec<NodeId>>,
    unreachable: Vec<NodeId>,
    dead_ends: Vec<NodeId>,
}

impl GraphCompiler {
    #[must_use]
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Run all structural checks and return the full diagnostic report.
    ///
    /// Never fails; a structurally broken graph yields `valid: false` with
    /// every discovered error listed.
    #[must_use]
    pub fn validate(&self, def: &GraphDefinition) -> ValidationResult {
        let analysis = self.analyze(def);
        let valid = analysis.errors.is_empty();
        ValidationResult {
            valid,
            metadata: ValidationMetadata {
                node_count: def.nodes.len(),
                edge_count: def.edges.len(),
                max_depth: analysis.levels.len(),
                cyclic_paths: analysis.cyclic_paths,
                unreachable_nodes: analysis.unreachable,
                dead_end_nodes: analysis.dead_ends,
            },
            errors: analysis.errors,
            warnings: analysis.warnings,
            suggestions: analysis.suggestions,
        }
    }

    /// Compile a definition into an executable plan.
    ///
    /// # Errors
    ///
    /// Fails with [`GraphValidationError`] listing every structural error
    /// when the definition is empty, references missing node ids, contains a
    /// cycle, or exceeds configured limits.
    pub fn build(&self, def: &GraphDefinition) -> Result<ExecutableGraph, GraphValidationError> {
        let analysis = self.analyze(def);
        if !analysis.errors.is_empty() {
            return Err(GraphValidationError::from_result(&def.id, analysis.errors));
        }
        tracing::debug!(
            graph = %def.id,
            nodes = def.nodes.len(),
            levels = analysis.levels.len(),
            "graph compiled"
        );
        Ok(ExecutableGraph {
            definition: def.clone(),
            dependencies: analysis.dependencies,
            dependents: analysis.dependents,
            execution_order: analysis
                .levels
                .iter()
                .enumerate()
                .flat_map(|(level, nodes)| nodes.iter().map(move |n| (n.clone(), level)))
                .collect(),
            entry_points: analysis.entry_points,
            exit_points: analysis.exit_points,
            execution_plan: analysis.levels,
        })
    }

    fn analyze(&self, def: &GraphDefinition) -> Analysis {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        if def.nodes.is_empty() {
            errors.push(ValidationIssue::new(
                "empty_graph",
                "graph has no nodes".to_string(),
            ));
        }

        let limits = def.limits();
        if def.nodes.len() > limits.max_nodes {
            errors.push(ValidationIssue::new(
                "node_limit",
                format!(
                    "graph has {} nodes, exceeding the limit of {}",
                    def.nodes.len(),
                    limits.max_nodes
                ),
            ));
        }
        if def.edges.len() > limits.max_edges {
            errors.push(ValidationIssue::new(
                "edge_limit",
                format!(
                    "graph has {} edges, exceeding the limit of {}",
                    def.edges.len(),
                    limits.max_edges
                ),
            ));
        }

        let node_ids: Vec<NodeId> = def.nodes.iter().map(|n| n.id.clone()).collect();
        let known: FxHashSet<&str> = node_ids.iter().map(String::as_str).collect();

        let mut seen = FxHashSet::default();
        for node in &def.nodes {
            if !seen.insert(node.id.as_str()) {
                errors.push(
                    ValidationIssue::new(
                        "duplicate_node",
                        format!("node id '{}' is declared more than once", node.id),
                    )
                    .for_node(node.id.clone()),
                );
            }
        }

        // Adjacency over valid edges only; dangling references are reported
        // but excluded from the structural analysis.
        let mut dependencies: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
        let mut dependents: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
        let mut gated_in: FxHashSet<&str> = FxHashSet::default();
        let mut has_out: FxHashSet<&str> = FxHashSet::default();

        for edge in &def.edges {
            let mut dangling = false;
            for endpoint in [&edge.from, &edge.to] {
                if !known.contains(endpoint.as_str()) {
                    errors.push(
                        ValidationIssue::new(
                            "missing_node",
                            format!(
                                "edge '{}' references unknown node '{}'",
                                edge.id, endpoint
                            ),
                        )
                        .for_edge(edge.id.clone()),
                    );
                    dangling = true;
                }
            }
            if dangling {
                continue;
            }
            dependencies
                .entry(edge.to.clone())
                .or_default()
                .insert(edge.from.clone());
            dependents
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone());
            has_out.insert(edge.from.as_str());
            if matches!(edge.edge_type, EdgeType::Data | EdgeType::Control) {
                gated_in.insert(edge.to.as_str());
            }
        }

        let entry_points: Vec<NodeId> = node_ids
            .iter()
            .filter(|id| !gated_in.contains(id.as_str()))
            .cloned()
            .collect();
        let exit_points: Vec<NodeId> = node_ids
            .iter()
            .filter(|id| !has_out.contains(id.as_str()))
            .cloned()
            .collect();

        let cyclic_paths = detect_cycles(&node_ids, &dependents);
        for path in &cyclic_paths {
            errors.push(ValidationIssue::new(
                "cycle",
                format!("cycle detected: {}", path.join(" -> ")),
            ));
        }

        let levels = topological_levels(&node_ids, &dependencies);

        // Reachability from entry points, following every edge kind.
        let mut reachable: FxHashSet<&str> =
            entry_points.iter().map(String::as_str).collect();
        let mut stack: Vec<&str> = reachable.iter().copied().collect();
        while let Some(current) = stack.pop() {
            if let Some(next) = dependents.get(current) {
                for target in next {
                    if reachable.insert(target.as_str()) {
                        stack.push(target.as_str());
                    }
                }
            }
        }
        let unreachable: Vec<NodeId> = node_ids
            .iter()
            .filter(|id| !reachable.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &unreachable {
            let issue = ValidationIssue::new(
                "unreachable",
                format!("node '{id}' is unreachable from any entry point"),
            )
            .for_node(id.clone());
            if self.options.strict {
                errors.push(issue);
            } else {
                warnings.push(issue);
            }
        }

        let dead_ends: Vec<NodeId> = exit_points
            .iter()
            .filter(|id| !def.is_output_node(id))
            .cloned()
            .collect();
        for id in &dead_ends {
            warnings.push(
                ValidationIssue::new(
                    "dead_end",
                    format!("node '{id}' has no outgoing edge and is not a designated output"),
                )
                .for_node(id.clone()),
            );
        }

        if !unreachable.is_empty() {
            suggestions.push(
                "connect unreachable nodes to an entry point or remove them".to_string(),
            );
        }
        if !dead_ends.is_empty() {
            suggestions.push(
                "mark intentional terminal nodes as outputs in the graph metadata".to_string(),
            );
        }

        Analysis {
            errors,
            warnings,
            suggestions,
            dependencies,
            dependents,
            levels,
            entry_points,
            exit_points,
            cyclic_paths,
            unreachable,
            dead_ends,
        }
    }
}

/// Tri-color DFS over the forward adjacency. Each back-edge into a Gray node
/// reports the full closed path from that node back to itself.
fn detect_cycles(
    node_ids: &[NodeId],
    dependents: &FxHashMap<NodeId, FxHashSet<NodeId>>,
) -> Vec<Vec<NodeId>> {
    let mut colors: FxHashMap<&str, Color> = node_ids
        .iter()
        .map(|id| (id.as_str(), Color::White))
        .collect();
    let mut cycles = Vec::new();

    fn visit<'a>(
        node: &'a str,
        dependents: &'a FxHashMap<NodeId, FxHashSet<NodeId>>,
        colors: &mut FxHashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<NodeId>>,
    ) {
        colors.insert(node, Color::Gray);
        path.push(node);
        if let Some(targets) = dependents.get(node) {
            // Sorted traversal keeps reported paths deterministic.
            let mut targets: Vec<&str> = targets.iter().map(String::as_str).collect();
            targets.sort_unstable();
            for target in targets {
                match colors.get(target).copied().unwrap_or(Color::White) {
                    Color::White => visit(target, dependents, colors, path, cycles),
                    Color::Gray => {
                        if let Some(start) = path.iter().position(|n| *n == target) {
                            let mut cycle: Vec<NodeId> =
                                path[start..].iter().map(|s| s.to_string()).collect();
                            cycle.push(target.to_string());
                            cycles.push(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        path.pop();
        colors.insert(node, Color::Black);
    }

    let mut path = Vec::new();
    for id in node_ids {
        if colors.get(id.as_str()).copied() == Some(Color::White) {
            visit(id.as_str(), dependents, &mut colors, &mut path, &mut cycles);
        }
    }
    cycles
}

/// Kahn's algorithm by waves: each wave removes every currently
/// zero-remaining-dependency node, so a node's wave index equals the length
/// of the longest dependency chain ending at it. Nodes on a cycle are never
/// removed and are simply absent from the returned levels.
fn topological_levels(
    node_ids: &[NodeId],
    dependencies: &FxHashMap<NodeId, FxHashSet<NodeId>>,
) -> Vec<Vec<NodeId>> {
    let mut remaining: FxHashMap<&str, FxHashSet<&str>> = node_ids
        .iter()
        .map(|id| {
            (
                id.as_str(),
                dependencies
                    .get(id)
                    .map(|deps| deps.iter().map(String::as_str).collect())
                    .unwrap_or_default(),
            )
        })
        .collect();

    let mut levels: Vec<Vec<NodeId>> = Vec::new();
    while !remaining.is_empty() {
        // Definition order within a wave is the scheduler's dispatch order.
        let wave: Vec<&str> = node_ids
            .iter()
            .map(String::as_str)
            .filter(|id| remaining.get(id).is_some_and(|deps| deps.is_empty()))
            .collect();
        if wave.is_empty() {
            break; // remaining nodes form cycles
        }
        for id in &wave {
            remaining.remove(id);
        }
        for deps in remaining.values_mut() {
            for id in &wave {
                deps.remove(id);
            }
        }
        levels.push(wave.iter().map(|s| s.to_string()).collect());
    }
    levels
}
