//! Tracing setup and human-oriented rendering of engine events.
//!
//! The formatters back the stdout event sink; programmatic consumers should
//! subscribe to the [`EventBus`](crate::event_bus::EventBus) with their own
//! sink and work with the typed [`Event`](crate::event_bus::Event) instead.

use std::io::IsTerminal;

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::event_bus::Event;

/// Install the global tracing subscriber: an env-filtered fmt layer plus
/// span-context capture for errors. Later calls are no-ops, so libraries
/// and tests may call it unconditionally.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Keeps any subscriber a caller installed first.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(ErrorLayer::default())
        .try_init();
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

/// How rendered output should be decorated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatterMode {
    /// ANSI colors when stdout is a terminal, plain otherwise.
    #[default]
    Auto,
    Ansi,
    Plain,
}

impl FormatterMode {
    /// Materialize a formatter for this mode.
    #[must_use]
    pub fn formatter(self) -> Box<dyn TelemetryFormatter> {
        let ansi = match self {
            FormatterMode::Ansi => true,
            FormatterMode::Plain => false,
            FormatterMode::Auto => std::io::stdout().is_terminal(),
        };
        if ansi {
            Box::new(AnsiFormatter)
        } else {
            Box::new(PlainFormatter)
        }
    }
}

/// Turns one event into one display line.
pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> String;
}

/// Undecorated single-line rendering.
pub struct PlainFormatter;

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> String {
        format!("{:<20} {event}", event.name())
    }
}

/// Single-line rendering with severity coloring.
pub struct AnsiFormatter;

impl TelemetryFormatter for AnsiFormatter {
    fn render_event(&self, event: &Event) -> String {
        let color = match event {
            Event::NodeCompleted { .. } | Event::ExecutionCompleted { .. } => GREEN,
            Event::NodeFailed { .. } => RED,
            Event::StateRestored { .. } | Event::Diagnostic { .. } => YELLOW,
            Event::NodeStarted { .. } | Event::StatusChanged { .. } => CYAN,
            _ => DIM,
        };
        format!("{color}{:<20}{RESET} {event}", event.name())
    }
}
