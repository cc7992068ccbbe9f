//! Engine event stream: one typed event per recorded transition.
//!
//! The store and scheduler push [`Event`]s into a shared flume channel; an
//! [`EventBus`] listener drains it and fans events out to [`EventSink`]s
//! (stdout rendering, in-memory capture, or forwarding to an external
//! channel for streaming consumers). Delivery is FIFO per execution and
//! sink failures never abort emission.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use gridflow::event_bus::{Event, EventBus, MemorySink};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sink = Arc::new(MemorySink::new());
//! let bus = EventBus::with_sinks(vec![Box::new(Arc::clone(&sink))]);
//! bus.start_listener();
//!
//! bus.get_sender()
//!     .send(Event::CleanupCompleted { execution_id: "exec-1".into() })
//!     .unwrap();
//!
//! tokio::task::yield_now().await;
//! bus.stop_listener().await;
//! assert_eq!(sink.snapshot().len(), 1);
//! # }
//! ```

mod bus;
mod event;
mod sink;

pub use bus::EventBus;
pub use event::Event;
pub use sink::{ChannelSink, EventSink, MemorySink, SinkError, StdOutSink};

use std::sync::Arc;

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn handle(&self, event: &Event) -> Result<(), SinkError> {
        (**self).handle(event)
    }
}
