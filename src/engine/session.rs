//! Session switching and streaming transitions

use tracing::{debug, info, warn};

use super::state::ControllerState;
use super::Engine;
use crate::error::{AppError, Result};
use crate::events::EngineEvent;
use crate::scene::SceneReplica;
use crate::transport::ChannelKind;

impl Engine {
    /// Leave the current session (if any) and join `session_id`
    ///
    /// Steps run strictly in order: teardown of the old session completes
    /// before the new bind, and presence is published only after the bind
    /// succeeded.
    pub(super) async fn switch_to(&mut self, session_id: &str) -> Result<()> {
        if self.state.current_session.as_deref() == Some(session_id) {
            return Err(AppError::AlreadyJoined(session_id.to_string()));
        }
        let info = self.state.registry.select(session_id)?.clone();

        self.teardown_session().await;

        self.state.controller = ControllerState::Joining;
        info!(
            "Joining session {} on osc.udp://{}:{}",
            session_id, info.send_addr, info.send_port
        );
        let handle = match self
            .transport
            .join(ChannelKind::Scene, info.send_addr, info.send_port)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.state.controller = ControllerState::Idle;
                let reason = e.to_string();
                self.events.publish(EngineEvent::JoinFailed {
                    session_id: session_id.to_string(),
                    reason: reason.clone(),
                });
                return Err(AppError::JoinFailed {
                    session_id: session_id.to_string(),
                    reason,
                });
            }
        };
        self.scene_handle = Some(handle);

        let replica = SceneReplica::new(
            session_id,
            &self.state.viewer_id,
            &self.config.peer_node_type,
        );
        self.state.replicas.insert(session_id.to_string(), replica);
        self.state.current_session = Some(session_id.to_string());
        self.state.controller = ControllerState::Joined;

        self.publish_presence()?;

        self.events.publish(EngineEvent::ConnectionChanged {
            connected: true,
            session_id: Some(session_id.to_string()),
        });
        self.events.publish(EngineEvent::SessionJoined {
            session_id: session_id.to_string(),
        });
        info!("Joined session {}", session_id);
        Ok(())
    }

    /// Stop streaming with every peer, drop the replica and leave the scene
    /// channel. Leave errors are logged, not returned.
    pub(super) async fn teardown_session(&mut self) {
        let Some(session_id) = self.state.current_session.clone() else {
            return;
        };
        info!("Leaving session {}", session_id);

        let streaming = self
            .state
            .active_replica()
            .map(|r| r.streaming_peer_ids())
            .unwrap_or_default();
        for peer_id in streaming {
            self.stop_streaming_with(&peer_id).await;
        }

        self.state.replicas.remove(&session_id);
        self.state.current_session = None;
        self.state.controller = ControllerState::Idle;

        if let Some(handle) = self.scene_handle.take() {
            if let Err(e) = self.transport.leave(&handle).await {
                warn!("Failed to leave scene channel of {}: {}", session_id, e);
            }
        }

        self.events.publish(EngineEvent::ConnectionChanged {
            connected: false,
            session_id: None,
        });
    }

    /// Create our node and publish our attributes and shared textures
    fn publish_presence(&self) -> Result<()> {
        let attributes = self.local.to_attributes();
        let textures = self.local.texture_ids();
        let viewer = self.state.viewer_id.as_str();
        let peer_type = self.config.peer_node_type.as_str();
        self.send_to_session(|paths| paths.presence(viewer, peer_type, &attributes, &textures))?;
        debug!(
            "Published {} attributes and {} shared textures",
            attributes.len(),
            textures.len()
        );
        Ok(())
    }

    /// Mark `peer_id` as streaming and hand it to the supervisor
    pub(super) async fn start_streaming_with(&mut self, peer_id: &str) {
        let Some(session_id) = self.state.current_session.clone() else {
            return;
        };
        let peer = match self.state.active_replica_mut().map(|r| r.peer_mut(peer_id)) {
            Some(Ok(peer)) if !peer.streaming => {
                peer.streaming = true;
                peer.clone()
            }
            _ => return,
        };

        info!("Ready to stream with {}", peer_id);
        self.events.publish(EngineEvent::StreamingStarted {
            session_id: session_id.clone(),
            peer_id: peer_id.to_string(),
        });
        if let Err(e) = self.supervisor.start_streaming(&session_id, &peer).await {
            warn!("Failed to start pipelines with {}: {}", peer_id, e);
        }
    }

    /// Clear the streaming flag of `peer_id` and tear down its pipelines
    ///
    /// Does nothing if the peer is not streaming, so a peer is never stopped
    /// twice.
    pub(super) async fn stop_streaming_with(&mut self, peer_id: &str) {
        let Some(session_id) = self.state.current_session.clone() else {
            return;
        };
        match self.state.active_replica_mut().map(|r| r.peer_mut(peer_id)) {
            Some(Ok(peer)) if peer.streaming => peer.streaming = false,
            _ => return,
        }

        info!("Stopping streaming with {}", peer_id);
        self.events.publish(EngineEvent::StreamingStopped {
            session_id: session_id.clone(),
            peer_id: peer_id.to_string(),
        });
        if let Err(e) = self.supervisor.stop_streaming(&session_id, peer_id).await {
            warn!("Failed to stop pipelines with {}: {}", peer_id, e);
        }
    }
}
