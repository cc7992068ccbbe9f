//! One-stop façade assembling compiler, store, scheduler, and event bus.

use std::sync::Arc;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::compiler::{GraphCompiler, GraphValidationError};
use crate::definition::GraphDefinition;
use crate::event_bus::{ChannelSink, Event, EventBus, EventSink, StdOutSink};
use crate::executor::ExecutorRegistry;
use crate::runtime::config::{ConfigError, EngineConfig};
use crate::scheduler::{ExecutionConfig, ExecutionResult, Scheduler, SchedulerError};
use crate::store::{StateError, StateStore};
use crate::types::{ExecutionId, ExecutionStatus};

/// Faults surfaced by the engine façade.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] GraphValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("streaming is not enabled on this engine")]
    #[diagnostic(
        code(gridflow::runtime::streaming_disabled),
        help("Construct the engine with WorkflowEngine::with_streaming to stream events.")
    )]
    StreamingDisabled,
}

/// Assembles the three subsystems behind a single `execute` entry point.
///
/// One engine serves many executions; each `execute` call compiles the
/// definition, registers a fresh execution id in the store, schedules it,
/// and cleans the execution up afterwards. Use [`WorkflowEngine::store`]
/// for mid-flight control (pause, cancel, checkpoints).
///
/// # Examples
///
/// ```rust,no_run
/// use gridflow::definition::GraphDefinition;
/// use gridflow::executor::{ExecutorRegistry, PassthroughExecutor};
/// use gridflow::runtime::{EngineConfig, WorkflowEngine};
/// use gridflow::scheduler::ExecutionConfig;
/// use gridflow::types::NodeType;
/// use serde_json::json;
///
/// # async fn demo() -> miette::Result<()> {
/// let registry = ExecutorRegistry::new().with_executor("input", PassthroughExecutor);
/// let engine = WorkflowEngine::new(EngineConfig::default(), registry)?;
///
/// let def = GraphDefinition::builder("hello")
///     .add_node("in", NodeType::Input)
///     .build();
/// let result = engine
///     .execute(&def, json!({"greeting": "hi"}), &ExecutionConfig::default(), json!({}))
///     .await?;
/// assert!(result.success);
/// # Ok(())
/// # }
/// ```
pub struct WorkflowEngine {
    compiler: GraphCompiler,
    store: Arc<StateStore>,
    registry: ExecutorRegistry,
    bus: EventBus,
    stream: Option<flume::Receiver<Event>>,
}

impl WorkflowEngine {
    /// Engine with the default stdout event sink.
    pub fn new(config: EngineConfig, registry: ExecutorRegistry) -> Result<Self, EngineError> {
        Self::assemble(config, registry, vec![Box::<StdOutSink>::default()], false)
    }

    /// Engine with caller-chosen sinks (possibly none).
    pub fn with_sinks(
        config: EngineConfig,
        registry: ExecutorRegistry,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> Result<Self, EngineError> {
        Self::assemble(config, registry, sinks, false)
    }

    /// Engine that additionally exposes the event stream through
    /// [`WorkflowEngine::stream_events`] / [`WorkflowEngine::execute_stream`].
    pub fn with_streaming(
        config: EngineConfig,
        registry: ExecutorRegistry,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> Result<Self, EngineError> {
        Self::assemble(config, registry, sinks, true)
    }

    fn assemble(
        config: EngineConfig,
        registry: ExecutorRegistry,
        mut sinks: Vec<Box<dyn EventSink>>,
        streaming: bool,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let stream = if streaming {
            let (tx, rx) = flume::unbounded();
            sinks.push(Box::new(ChannelSink::new(tx)));
            Some(rx)
        } else {
            None
        };
        let bus = EventBus::with_sinks(sinks);
        let store =
            Arc::new(StateStore::new(config.checkpointing.clone()).with_emitter(bus.get_sender()));
        Ok(Self {
            compiler: GraphCompiler::default(),
            store,
            registry,
            bus,
            stream,
        })
    }

    /// The shared state store, for mid-flight control and projections.
    #[must_use]
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Receiver over all engine events, multiplexed by execution id.
    ///
    /// Consumers filter on [`Event::execution_id`]. Only available on
    /// engines built with [`WorkflowEngine::with_streaming`].
    pub fn stream_events(&self) -> Result<flume::Receiver<Event>, EngineError> {
        self.stream.clone().ok_or(EngineError::StreamingDisabled)
    }

    /// As [`stream_events`](Self::stream_events), adapted to a
    /// [`futures_util::Stream`] for `while let Some(event) = stream.next()`
    /// style consumption.
    pub fn event_stream(
        &self,
    ) -> Result<impl futures_util::Stream<Item = Event> + Send, EngineError> {
        Ok(self.stream_events()?.into_stream())
    }

    fn next_execution_id() -> ExecutionId {
        format!("exec-{}", Uuid::new_v4())
    }

    /// Compile, initialize, schedule, and clean up one execution.
    #[instrument(skip_all, fields(graph_id = %definition.id))]
    pub async fn execute(
        &self,
        definition: &GraphDefinition,
        input: Value,
        exec_config: &ExecutionConfig,
        context: Value,
    ) -> Result<ExecutionResult, EngineError> {
        let execution_id = Self::next_execution_id();
        self.run(&execution_id, definition, input, exec_config, context)
            .await
    }

    /// As [`execute`](Self::execute), but spawned; returns the execution id
    /// (for filtering the event stream), the stream receiver, and the join
    /// handle for the final result.
    #[allow(clippy::type_complexity)]
    pub fn execute_stream(
        self: &Arc<Self>,
        definition: GraphDefinition,
        input: Value,
        exec_config: ExecutionConfig,
        context: Value,
    ) -> Result<
        (
            ExecutionId,
            flume::Receiver<Event>,
            JoinHandle<Result<ExecutionResult, EngineError>>,
        ),
        EngineError,
    > {
        let receiver = self.stream_events()?;
        let execution_id = Self::next_execution_id();
        let engine = Arc::clone(self);
        let id = execution_id.clone();
        let handle = tokio::spawn(async move {
            engine
                .run(&id, &definition, input, &exec_config, context)
                .await
        });
        Ok((execution_id, receiver, handle))
    }

    async fn run(
        &self,
        execution_id: &str,
        definition: &GraphDefinition,
        input: Value,
        exec_config: &ExecutionConfig,
        context: Value,
    ) -> Result<ExecutionResult, EngineError> {
        self.bus.start_listener();
        let graph = self.compiler.build(definition)?;
        self.store
            .initialize(execution_id, &definition.id, definition.node_ids(), context)?;
        let scheduler = Scheduler::new(Arc::clone(&self.store), self.registry.clone())
            .with_emitter(self.bus.get_sender());
        let result = scheduler
            .execute(execution_id, &graph, input, exec_config)
            .await;
        if let Err(err) = self.store.cleanup(execution_id) {
            warn!(%err, execution_id, "post-execution cleanup failed");
        }
        Ok(result?)
    }

    /// Request a pause; the scheduler stops admitting nodes until resumed.
    pub fn pause(&self, execution_id: &str) -> Result<(), StateError> {
        self.store
            .update_execution_status(execution_id, ExecutionStatus::Paused)
    }

    /// Resume a paused execution.
    pub fn resume(&self, execution_id: &str) -> Result<(), StateError> {
        self.store
            .update_execution_status(execution_id, ExecutionStatus::Running)
    }

    /// Cooperatively cancel: in-flight nodes may finish, nothing new starts.
    pub fn cancel(&self, execution_id: &str) -> Result<(), StateError> {
        self.store
            .update_execution_status(execution_id, ExecutionStatus::Cancelled)
    }

    /// Stop the event listener and drop all execution state.
    pub async fn shutdown(&self) {
        self.bus.stop_listener().await;
        self.store.shutdown();
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}
