//! Event system for engine notifications
//!
//! The engine publishes registry, session, streaming and display events on a
//! broadcast bus. The console display in `main` and the integration tests are
//! its subscribers.

pub mod types;

pub use types::EngineEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Bus for broadcasting engine events
///
/// ```
/// use peerview::events::{EngineEvent, EventBus};
///
/// # tokio_test::block_on(async {
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
/// bus.publish(EngineEvent::SessionJoined {
///     session_id: "default".to_string(),
/// });
/// let event = rx.recv().await.unwrap();
/// assert_eq!(event.event_name(), "session.joined");
/// # });
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// Dropped silently when nobody listens.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Receiver of every event published from now on. Falling more than
    /// `EVENT_CHANNEL_CAPACITY` behind yields `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
