//! Observable bridge and view state changes.
//!
//! The bridge emits via [`EventBus::emit`]; UI layers subscribe via
//! [`EventBus::subscribe`]. Built on [`tokio::sync::broadcast`] so
//! multiple listeners can react independently.

use tokio::sync::broadcast;

/// Events that flow out of the bridge and view.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The engine signalled readiness. Emitted once per bridge.
    EngineReady,
    /// The "operation in flight" flag flipped.
    InFlightChanged { in_flight: bool },
    /// The engine reported an error unrelated to any call.
    EngineFault { message: String },
    /// The view finished loading and rendering content with this digest.
    ContentLoaded { digest: String },
}

/// A broadcast channel that any component can emit to or subscribe from.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
