//! Engine event types
//!
//! Defines all event types that can be broadcast through the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine event enumeration
///
/// Serialized as `{"event": "<name>", "data": {...}}`, e.g.
/// ```json
/// {
///   "event": "streaming.started",
///   "data": { "session_id": "default", "peer_id": "alice" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EngineEvent {
    // ============================================================================
    // Registry Events
    // ============================================================================
    /// A session was discovered or moved
    #[serde(rename = "registry.changed")]
    RegistryChanged {
        /// Every known session id, sorted
        session_ids: Vec<String>,
    },

    // ============================================================================
    // Session Events
    // ============================================================================
    /// Switch completed and local presence published
    #[serde(rename = "session.joined")]
    SessionJoined { session_id: String },

    /// Connected state changed. `session_id` is None when not joined.
    #[serde(rename = "session.connection_changed")]
    ConnectionChanged {
        connected: bool,
        session_id: Option<String>,
    },

    /// Scene channel could not be bound
    #[serde(rename = "session.join_failed")]
    JoinFailed { session_id: String, reason: String },

    /// First sighting of a remote peer in the joined session
    #[serde(rename = "peer.sighted")]
    PeerSighted { session_id: String, peer_id: String },

    // ============================================================================
    // Streaming Events
    // ============================================================================
    #[serde(rename = "streaming.started")]
    StreamingStarted { session_id: String, peer_id: String },

    #[serde(rename = "streaming.stopped")]
    StreamingStopped { session_id: String, peer_id: String },

    /// The proxy of a peer now shows another feed
    #[serde(rename = "geometry.feed_selected")]
    FeedSelected {
        session_id: String,
        peer_id: String,
        feed_id: String,
        /// Viewing angle in degrees that led to the choice
        angle: f64,
    },

    // ============================================================================
    // Display Events
    // ============================================================================
    /// Periodic human-readable state dump
    #[serde(rename = "display.snapshot")]
    Snapshot {
        text: String,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RegistryChanged { .. } => "registry.changed",
            Self::SessionJoined { .. } => "session.joined",
            Self::ConnectionChanged { .. } => "session.connection_changed",
            Self::JoinFailed { .. } => "session.join_failed",
            Self::PeerSighted { .. } => "peer.sighted",
            Self::StreamingStarted { .. } => "streaming.started",
            Self::StreamingStopped { .. } => "streaming.stopped",
            Self::FeedSelected { .. } => "geometry.feed_selected",
            Self::Snapshot { .. } => "display.snapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name() {
        let event = EngineEvent::StreamingStarted {
            session_id: "default".to_string(),
            peer_id: "alice".to_string(),
        };
        assert_eq!(event.event_name(), "streaming.started");

        let event = EngineEvent::Snapshot {
            text: String::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_name(), "display.snapshot");
    }

    #[test]
    fn test_serialization() {
        let event = EngineEvent::FeedSelected {
            session_id: "default".to_string(),
            peer_id: "alice".to_string(),
            feed_id: "peerview-01@host".to_string(),
            angle: 90.0,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"geometry.feed_selected\""));
        assert!(json.contains("\"feed_id\":\"peerview-01@host\""));

        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
