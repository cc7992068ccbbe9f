//! Multiplexed event channel with a background listener.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event_bus::sink::{EventSink, StdOutSink};
use crate::event_bus::Event;

/// Single multiplexed event channel shared by the store and scheduler.
///
/// Producers clone the sender via [`EventBus::get_sender`]; a background
/// listener drains the channel and fans each event out to every registered
/// sink, in registration order. A sink error is logged and never stops
/// delivery to subsequent sinks.
pub struct EventBus {
    sender: flume::Sender<Event>,
    receiver: flume::Receiver<Event>,
    sinks: Arc<Vec<Box<dyn EventSink>>>,
    listener: Mutex<Option<(JoinHandle<()>, oneshot::Sender<()>)>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sinks(vec![Box::<StdOutSink>::default()])
    }
}

impl EventBus {
    /// A bus with the default stdout sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with an explicit sink list (possibly empty).
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            sinks: Arc::new(sinks),
            listener: Mutex::new(None),
        }
    }

    /// Sender handle for producers (store, scheduler).
    #[must_use]
    pub fn get_sender(&self) -> flume::Sender<Event> {
        self.sender.clone()
    }

    /// Spawn the background listener. Idempotent; a second call is a no-op
    /// while a listener is running.
    pub fn start_listener(&self) {
        let mut guard = self.listener.lock();
        if guard.is_some() {
            return;
        }
        let receiver = self.receiver.clone();
        let sinks = Arc::clone(&self.sinks);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    received = receiver.recv_async() => {
                        let Ok(event) = received else { break };
                        for sink in sinks.iter() {
                            if let Err(err) = sink.handle(&event) {
                                warn!(%err, "event sink failed");
                            }
                        }
                    }
                }
            }
            debug!("event listener stopped");
        });
        *guard = Some((handle, stop_tx));
    }

    /// Stop the listener after it drains events already queued.
    pub async fn stop_listener(&self) {
        let taken = self.listener.lock().take();
        if let Some((handle, stop_tx)) = taken {
            // The listener exits on its next select round.
            if stop_tx.send(()).is_err() {
                handle.abort();
                return;
            }
            if handle.await.is_err() {
                warn!("event listener did not shut down cleanly");
            }
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some((handle, _stop_tx)) = self.listener.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sinks.len())
            .field("listening", &self.listener.lock().is_some())
            .finish()
    }
}
