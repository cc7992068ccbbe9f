//! State-store invariants under realistic call sequences.

use chrono::Utc;
use gridflow::store::{
    CheckpointFrequency, CheckpointPolicy, NodeExecutionResult, StateStore,
};
use gridflow::types::NodeStatus;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn store_with(retention: usize) -> Arc<StateStore> {
    Arc::new(StateStore::new(CheckpointPolicy {
        enabled: true,
        frequency: CheckpointFrequency::Manual,
        retention,
        ..CheckpointPolicy::default()
    }))
}

fn complete(store: &StateStore, node: &str) {
    store.start_node("exec-1", node, json!(null)).unwrap();
    store
        .complete_node(
            "exec-1",
            node,
            NodeExecutionResult::success(node, json!(format!("{node}-out")), Utc::now(), 0),
        )
        .unwrap();
}

#[test]
fn percentage_advances_in_quarters() {
    let store = store_with(10);
    store
        .initialize(
            "exec-1",
            "g",
            ["n1", "n2", "n3", "n4"].map(String::from),
            json!({}),
        )
        .unwrap();
    let mut observed = Vec::new();
    for node in ["n1", "n2", "n3", "n4"] {
        complete(&store, node);
        observed.push(store.get_progress("exec-1").unwrap().percentage);
    }
    assert_eq!(observed, vec![25, 50, 75, 100]);
}

#[test]
fn projections_are_idempotent_between_mutations() {
    let store = store_with(10);
    store
        .initialize("exec-1", "g", ["a", "b"].map(String::from), json!({}))
        .unwrap();
    complete(&store, "a");
    store.create_checkpoint("exec-1", None).unwrap();

    let p1 = store.get_progress("exec-1").unwrap();
    let p2 = store.get_progress("exec-1").unwrap();
    assert_eq!(p1, p2);
    let c1 = store.get_checkpoints("exec-1").unwrap();
    let c2 = store.get_checkpoints("exec-1").unwrap();
    assert_eq!(c1.len(), c2.len());
    assert_eq!(c1[0].id, c2[0].id);
}

#[test]
fn completed_count_is_monotonic() {
    let store = store_with(10);
    store
        .initialize("exec-1", "g", ["a", "b", "c"].map(String::from), json!({}))
        .unwrap();
    let mut last = 0;
    for node in ["a", "b", "c"] {
        complete(&store, node);
        let now = store.get_progress("exec-1").unwrap().completed_nodes;
        assert!(now >= last);
        last = now;
    }
    assert_eq!(last, 3);
}

#[test]
fn unknown_execution_projections_are_absent_not_errors() {
    let store = store_with(10);
    assert!(store.get_progress("ghost").is_none());
    assert!(store.get_performance_metrics("ghost").is_none());
    assert!(store.get_checkpoints("ghost").is_none());
    assert!(store.get_node_output("ghost", "a").is_none());
}

#[test]
fn default_checkpoint_label_is_timestamped() {
    let store = store_with(10);
    store
        .initialize("exec-1", "g", ["a"].map(String::from), json!({}))
        .unwrap();
    let cp = store.create_checkpoint("exec-1", None).unwrap();
    assert!(cp.metadata.label.starts_with("Auto-checkpoint "));
}

/// Operation shapes a scheduler can legally apply to one node after
/// another: complete it, fail it, or fail-then-retry-then-complete.
#[derive(Clone, Debug)]
enum NodeScript {
    Complete,
    Fail,
    FailRetryComplete,
}

fn node_script() -> impl Strategy<Value = NodeScript> {
    prop_oneof![
        Just(NodeScript::Complete),
        Just(NodeScript::Fail),
        Just(NodeScript::FailRetryComplete),
    ]
}

proptest! {
    /// Disjointness holds at every step of any legal transition sequence,
    /// and the four sets always partition the full node set.
    #[test]
    fn node_sets_stay_disjoint(scripts in proptest::collection::vec(node_script(), 1..12)) {
        let store = store_with(10);
        let nodes: Vec<String> = (0..scripts.len()).map(|i| format!("n{i}")).collect();
        store
            .initialize("exec-1", "g", nodes.clone(), json!({}))
            .unwrap();

        for (node, script) in nodes.iter().zip(&scripts) {
            match script {
                NodeScript::Complete => {
                    store.start_node("exec-1", node, json!(null)).unwrap();
                    store
                        .complete_node(
                            "exec-1",
                            node,
                            NodeExecutionResult::success(node, json!(1), Utc::now(), 0),
                        )
                        .unwrap();
                }
                NodeScript::Fail => {
                    store.start_node("exec-1", node, json!(null)).unwrap();
                    store
                        .fail_node(
                            "exec-1",
                            node,
                            NodeExecutionResult::failure(
                                node,
                                NodeStatus::Failed,
                                "boom",
                                Utc::now(),
                                0,
                            ),
                        )
                        .unwrap();
                }
                NodeScript::FailRetryComplete => {
                    store.start_node("exec-1", node, json!(null)).unwrap();
                    store
                        .fail_node(
                            "exec-1",
                            node,
                            NodeExecutionResult::failure(
                                node,
                                NodeStatus::Failed,
                                "boom",
                                Utc::now(),
                                0,
                            ),
                        )
                        .unwrap();
                    store.retry_node("exec-1", node).unwrap();
                    store.start_node("exec-1", node, json!(null)).unwrap();
                    store
                        .complete_node(
                            "exec-1",
                            node,
                            NodeExecutionResult::success(node, json!(1), Utc::now(), 1),
                        )
                        .unwrap();
                }
            }
            let state = store.get_state("exec-1").unwrap();
            prop_assert!(state.sets_disjoint());
            prop_assert_eq!(state.total_nodes(), nodes.len());
        }
    }

    /// Error rate is exactly |failed| / total after any script mix.
    #[test]
    fn error_rate_matches_failed_fraction(scripts in proptest::collection::vec(node_script(), 1..10)) {
        let store = store_with(10);
        let nodes: Vec<String> = (0..scripts.len()).map(|i| format!("n{i}")).collect();
        store
            .initialize("exec-1", "g", nodes.clone(), json!({}))
            .unwrap();
        let mut failed = 0usize;
        for (node, script) in nodes.iter().zip(&scripts) {
            store.start_node("exec-1", node, json!(null)).unwrap();
            match script {
                NodeScript::Fail => {
                    failed += 1;
                    store
                        .fail_node(
                            "exec-1",
                            node,
                            NodeExecutionResult::failure(node, NodeStatus::Failed, "x", Utc::now(), 0),
                        )
                        .unwrap();
                }
                _ => {
                    store
                        .complete_node(
                            "exec-1",
                            node,
                            NodeExecutionResult::success(node, json!(1), Utc::now(), 0),
                        )
                        .unwrap();
                }
            }
        }
        let metrics = store.get_performance_metrics("exec-1").unwrap();
        let expected = failed as f64 / nodes.len() as f64;
        prop_assert!((metrics.error_rate - expected).abs() < 1e-9);
    }
}
