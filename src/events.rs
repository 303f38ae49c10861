//! Status channel between the engine and whatever presents it.
//!
//! Components never print. They report through an [`EventSink`] that the
//! embedding layer supplies: the CLI uses [`LogSink`] to forward events to
//! the `log` facade, tests and GUI shells can use [`MemorySink`] to collect
//! them.
//!
//! Events from parallel scan workers are recorded in the order the workers
//! reach the sink, not in discovery order.

use std::sync::{Mutex, PoisonError};

use log::Level;

/// Receiver for free-text status produced by the pipeline.
pub trait EventSink: Send + Sync {
    /// Record a status line.
    fn emit(&self, level: Level, message: &str);

    /// Show a one-shot user notification (tray balloon, toast, ...).
    fn notify(&self, _title: &str, _message: &str) {}

    /// Enable or disable UI controls that can start a manual run.
    fn controls_enabled(&self, _enabled: bool) {}

    /// Called once when a coordinator run has finished, success or not.
    fn finished(&self) {}

    /// Shorthand for `emit(Level::Error, ..)`.
    fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }

    /// Shorthand for `emit(Level::Warn, ..)`.
    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    /// Shorthand for `emit(Level::Info, ..)`.
    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    /// Shorthand for `emit(Level::Debug, ..)`.
    fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, level: Level, message: &str) {
        log::log!(target: "cachepatch", level, "{}", message);
    }

    fn notify(&self, title: &str, message: &str) {
        log::info!(target: "cachepatch", "[{}] {}", title, message);
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Status line.
    Status(Level, String),
    /// User notification.
    Notification(String, String),
    /// Controls toggled.
    Controls(bool),
    /// Run finished.
    Finished,
}

/// Collects events in memory, in sink-acquisition order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Copy of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status messages at `level`.
    #[must_use]
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(l, m) if l == level => Some(m),
                _ => None,
            })
            .collect()
    }

    /// True if any status message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Event::Status(_, m) if m.contains(needle)))
    }

    /// Number of recorded notifications.
    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Notification(..)))
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, level: Level, message: &str) {
        self.push(Event::Status(level, message.to_string()));
    }

    fn notify(&self, title: &str, message: &str) {
        self.push(Event::Notification(title.to_string(), message.to_string()));
    }

    fn controls_enabled(&self, enabled: bool) {
        self.push(Event::Controls(enabled));
    }

    fn finished(&self) {
        self.push(Event::Finished);
    }
}
