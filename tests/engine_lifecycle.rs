//! Façade-level lifecycle: streaming, cancellation, checkpoint restore.

mod common;

use common::chain4;
use gridflow::definition::GraphDefinition;
use gridflow::event_bus::Event;
use gridflow::executor::{DelayExecutor, ExecutorRegistry, PassthroughExecutor};
use gridflow::runtime::{EngineConfig, WorkflowEngine};
use gridflow::scheduler::ExecutionConfig;
use futures_util::StreamExt;
use gridflow::types::{EdgeType, ExecutionStatus, NodeStatus, NodeType};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn passthrough_registry() -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with_executor("input", PassthroughExecutor)
        .with_executor("transform", PassthroughExecutor)
        .with_executor("delay", DelayExecutor)
}

async fn wait_for_event<S>(stream: &mut S, want: fn(&Event) -> bool)
where
    S: futures_util::Stream<Item = Event> + Unpin,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed");
        if want(&event) {
            return;
        }
    }
}

async fn drain_until_cleanup(rx: &flume::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        let done = matches!(received, Event::CleanupCompleted { .. });
        events.push(received);
        if done {
            return events;
        }
    }
}

#[tokio::test]
async fn streaming_yields_one_event_per_transition_in_order() {
    let engine = Arc::new(
        WorkflowEngine::with_streaming(EngineConfig::default(), passthrough_registry(), vec![])
            .unwrap(),
    );
    let def = GraphDefinition::builder("single")
        .add_node("only", NodeType::Input)
        .build();

    let (execution_id, rx, handle) = engine
        .execute_stream(def, json!({"k": 1}), ExecutionConfig::default(), json!({}))
        .unwrap();
    let result = handle.await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.execution.execution_id, execution_id);

    let events = drain_until_cleanup(&rx).await;
    let names: Vec<&str> = events.iter().map(Event::name).collect();
    let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();
    assert_eq!(names[0], "initialized");
    assert!(pos("node_started") < pos("node_completed"));
    assert!(pos("node_completed") < pos("execution_completed"));
    assert!(names.contains(&"metrics"));
    assert_eq!(*names.last().unwrap(), "cleanup_completed");
    // Every event in the stream belongs to this execution.
    assert!(events
        .iter()
        .all(|e| e.execution_id() == Some(execution_id.as_str())));
}

#[tokio::test]
async fn cancellation_stops_dispatch_but_not_in_flight_nodes() {
    let engine = Arc::new(
        WorkflowEngine::with_streaming(EngineConfig::default(), passthrough_registry(), vec![])
            .unwrap(),
    );
    let def = GraphDefinition::builder("cancellable")
        .add_node_with_config("slow", NodeType::Delay, json!({"delay_ms": 300}))
        .add_node("after", NodeType::Transform)
        .add_edge("slow", "after", EdgeType::Data)
        .build();

    let (execution_id, _rx, handle) = engine
        .execute_stream(def, json!(null), ExecutionConfig::default(), json!({}))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.cancel(&execution_id).unwrap();

    let result = handle.await.unwrap().unwrap();
    assert!(!result.success);
    assert_eq!(result.execution.status, ExecutionStatus::Cancelled);
    assert_eq!(result.error.as_ref().unwrap().code, "EXECUTION_CANCELLED");
    // The in-flight delay node ran to completion; its dependent never
    // started.
    assert_eq!(
        result.results["slow"].status,
        gridflow::types::NodeStatus::Completed
    );
    assert_eq!(
        result.results["after"].status,
        gridflow::types::NodeStatus::Cancelled
    );
}

#[tokio::test]
async fn pause_blocks_new_nodes_until_resume() {
    gridflow::telemetry::init_tracing();
    let engine = Arc::new(
        WorkflowEngine::with_streaming(EngineConfig::default(), passthrough_registry(), vec![])
            .unwrap(),
    );
    let def = GraphDefinition::builder("pausable")
        .add_node_with_config("first", NodeType::Delay, json!({"delay_ms": 200}))
        .add_node("second", NodeType::Transform)
        .add_edge("first", "second", EdgeType::Data)
        .build();

    let mut stream = std::pin::pin!(engine.event_stream().unwrap());
    let (execution_id, _rx, handle) = engine
        .execute_stream(def, json!(null), ExecutionConfig::default(), json!({}))
        .unwrap();

    wait_for_event(&mut stream, |e| {
        matches!(e, Event::NodeStarted { node_id, .. } if node_id == "first")
    })
    .await;
    engine.pause(&execution_id).unwrap();

    // The in-flight node finishes, but its dependent is not admitted.
    wait_for_event(&mut stream, |e| {
        matches!(e, Event::NodeCompleted { node_id, .. } if node_id == "first")
    })
    .await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        engine.store().node_status(&execution_id, "second"),
        Some(NodeStatus::Pending)
    );

    engine.resume(&execution_id).unwrap();
    let result = handle.await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.results["second"].status, NodeStatus::Completed);
}

#[tokio::test]
async fn restore_after_partial_run_resumes_remaining_nodes() {
    // Drive the store directly through the engine's handle: complete half
    // the chain, checkpoint, simulate later mutations, restore, then let a
    // scheduler finish the rest.
    let def = chain4();
    let store = Arc::new(gridflow::store::StateStore::default());
    store
        .initialize("exec-1", &def.id, def.node_ids(), json!({}))
        .unwrap();
    let graph = gridflow::compiler::GraphCompiler::default()
        .build(&def)
        .unwrap();

    for node in ["a", "b"] {
        store.start_node("exec-1", node, json!(null)).unwrap();
        store
            .complete_node(
                "exec-1",
                node,
                gridflow::store::NodeExecutionResult::success(
                    node,
                    json!(node),
                    chrono::Utc::now(),
                    0,
                ),
            )
            .unwrap();
    }
    let cp = store.create_checkpoint("exec-1", Some("halfway".into())).unwrap();

    // Mutations after the checkpoint are discarded by restore.
    store.start_node("exec-1", "c", json!(null)).unwrap();
    store.restore_from_checkpoint("exec-1", &cp.id).unwrap();
    let state = store.get_state("exec-1").unwrap();
    assert!(state.completed.contains("b"));
    assert!(state.pending.contains("c"));

    let registry = ExecutorRegistry::new().with_executor("transform", PassthroughExecutor);
    let scheduler = gridflow::scheduler::Scheduler::new(Arc::clone(&store), registry);
    let result = scheduler
        .execute("exec-1", &graph, json!(null), &ExecutionConfig::default())
        .await
        .unwrap();

    assert!(result.success);
    // c resumed from b's checkpointed output.
    assert_eq!(result.results["c"].output, json!("b"));
    assert_eq!(store.get_progress("exec-1").unwrap().percentage, 100);
}
