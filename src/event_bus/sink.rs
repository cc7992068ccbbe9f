//! Pluggable destinations for engine events.

use parking_lot::Mutex;
use thiserror::Error;

use crate::event_bus::Event;
use crate::telemetry::{FormatterMode, TelemetryFormatter};

/// A sink failed to accept an event. The bus logs these and keeps going;
/// delivery to one sink never blocks delivery to the others.
#[derive(Debug, Error)]
#[error("event sink '{sink}' failed: {message}")]
pub struct SinkError {
    pub sink: &'static str,
    pub message: String,
}

/// Destination for events drained by the bus listener.
///
/// Implementations must be cheap and non-blocking; anything slow should
/// forward to its own channel and process elsewhere.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &Event) -> Result<(), SinkError>;
}

/// Renders events to stdout through a [`TelemetryFormatter`].
pub struct StdOutSink {
    formatter: Box<dyn TelemetryFormatter>,
}

impl StdOutSink {
    #[must_use]
    pub fn new(formatter: Box<dyn TelemetryFormatter>) -> Self {
        Self { formatter }
    }
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self::new(FormatterMode::Auto.formatter())
    }
}

impl EventSink for StdOutSink {
    fn handle(&self, event: &Event) -> Result<(), SinkError> {
        println!("{}", self.formatter.render_event(event));
        Ok(())
    }
}

/// Buffers events in memory for later inspection.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything captured so far, in delivery order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn handle(&self, event: &Event) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards events to an external channel, e.g. a streaming API consumer.
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&self, event: &Event) -> Result<(), SinkError> {
        self.sender.send(event.clone()).map_err(|_| SinkError {
            sink: "channel",
            message: "receiver dropped".to_string(),
        })
    }
}
