//! Reactions to inbound deliveries and timer ticks

use chrono::Utc;
use std::fmt::Write as _;
use tracing::{debug, info, trace, warn};

use super::state::ControllerState;
use super::Engine;
use crate::cameras::{self, CAMERA_COUNT_KEY};
use crate::error::AppError;
use crate::events::EngineEvent;
use crate::geometry;
use crate::osc::OscMessage;
use crate::readiness::{self, StreamTransition};
use crate::registry::{SessionInfo, SERVER_ANNOUNCE, USER_ANNOUNCE};
use crate::scene::{parse_address, Pose, SceneCommand};
use crate::transport::{ChannelKind, Delivery};

impl Engine {
    pub(super) async fn handle_delivery(&mut self, delivery: Delivery) {
        trace!("{} <- {}: {}", delivery.channel, delivery.sender, delivery.message);
        match delivery.channel {
            ChannelKind::Info => self.handle_info(&delivery.message).await,
            ChannelKind::Scene => {
                // Datagrams still queued from a binding we already left
                let current = self.scene_handle.as_ref().map(|h| h.id);
                if current != Some(delivery.handle_id) {
                    trace!("Dropping message from stale scene binding");
                    return;
                }
                self.handle_scene(&delivery.message).await;
            }
        }
    }

    async fn handle_info(&mut self, msg: &OscMessage) {
        let Some(suffix) = msg
            .address
            .strip_prefix(self.config.osc_root.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            debug!("Ignoring info message {}", msg.address);
            return;
        };

        match suffix {
            SERVER_ANNOUNCE => {}
            USER_ANNOUNCE => {
                trace!("Ignoring user announcement {}", msg);
                return;
            }
            _ => {
                debug!("Ignoring info message {}", msg.address);
                return;
            }
        }

        let info = match SessionInfo::from_announcement(msg) {
            Ok(info) => info,
            Err(e) => {
                warn!("Dropping session announcement: {}", e);
                return;
            }
        };
        let session_id = info.session_id.clone();
        let observation = self.state.registry.observe(info);
        if !observation.is_change() {
            return;
        }

        self.events.publish(EngineEvent::RegistryChanged {
            session_ids: self.state.registry.ids(),
        });

        let wants_auto_connect = self.config.default_session.as_deref() == Some(session_id.as_str())
            && self.state.controller == ControllerState::Idle
            && observation == crate::registry::Observation::Added;
        if wants_auto_connect {
            info!("Default session {} appeared, joining it", session_id);
            if let Err(e) = self.switch_to(&session_id).await {
                warn!("Could not join default session {}: {}", session_id, e);
            }
        }
    }

    async fn handle_scene(&mut self, msg: &OscMessage) {
        let Some(current) = self.state.current_session.clone() else {
            return;
        };
        let Some(address) = parse_address(&self.config.osc_root, &msg.address) else {
            trace!("Ignoring scene message {}", msg.address);
            return;
        };
        if address.session_id != current {
            trace!("Ignoring message for session {}", address.session_id);
            return;
        }

        let command = match SceneCommand::parse(&address, msg) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping scene message: {}", e);
                return;
            }
        };

        match command {
            SceneCommand::NodeList { node_type, ids } => self.on_node_list(&node_type, &ids),
            SceneCommand::DeleteNode { node_id } => self.on_delete_node(&node_id).await,
            SceneCommand::SetParam {
                node_id,
                key,
                value,
            } => self.on_set_param(&node_id, &key, &value).await,
            SceneCommand::Global6Dof { node_id, pose } => self.on_pose(&node_id, pose),
        }
    }

    fn on_node_list(&mut self, node_type: &str, ids: &[String]) {
        let Some(replica) = self.state.active_replica_mut() else {
            return;
        };
        let sighted = replica.apply_node_list(node_type, ids);
        let session_id = replica.session_id.clone();

        for peer_id in sighted {
            let viewer = self.state.viewer_id.as_str();
            let peer_type = self.config.peer_node_type.as_str();
            if let Err(e) = self
                .send_to_session(|paths| paths.proxy_creation(&peer_id, peer_type, viewer))
            {
                warn!("Could not create proxy for {}: {}", peer_id, e);
            }
            self.events.publish(EngineEvent::PeerSighted {
                session_id: session_id.clone(),
                peer_id,
            });
        }
    }

    async fn on_delete_node(&mut self, node_id: &str) {
        // Pipelines go down before the peer disappears
        self.stop_streaming_with(node_id).await;
        if let Some(replica) = self.state.active_replica_mut() {
            replica.remove_node(node_id);
        }
    }

    async fn on_set_param(&mut self, node_id: &str, key: &str, value: &str) {
        if key == CAMERA_COUNT_KEY {
            if let Err(e) = cameras::count_value(value) {
                warn!("Dropping setParam for {}: {}", node_id, e);
                return;
            }
        }
        let viewer_id = self.state.viewer_id.clone();
        let Some(replica) = self.state.active_replica_mut() else {
            return;
        };
        if let Err(e) = replica.set_attribute(node_id, key, value) {
            debug!("setParam {} for {}: {}", key, node_id, e);
            return;
        }
        if node_id == viewer_id {
            return;
        }

        let (ready, streaming) = match replica.peer(node_id) {
            Some(peer) => (readiness::is_ready(&peer.attributes), peer.streaming),
            None => return,
        };
        match readiness::evaluate(ready, streaming) {
            StreamTransition::Start => self.start_streaming_with(node_id).await,
            StreamTransition::Stop => self.stop_streaming_with(node_id).await,
            StreamTransition::None => {
                if !ready {
                    if let Some(peer) = self.state.active_replica().and_then(|r| r.peer(node_id)) {
                        trace!(
                            "{} not ready yet, missing {:?}",
                            node_id,
                            readiness::missing(&peer.attributes)
                        );
                    }
                }
            }
        }
    }

    fn on_pose(&mut self, node_id: &str, pose: Pose) {
        let is_viewer = node_id == self.state.viewer_id;
        let Some(replica) = self.state.active_replica_mut() else {
            return;
        };
        if let Err(e) = replica.set_pose(node_id, pose) {
            debug!("global6DOF for {}: {}", node_id, e);
            return;
        }
        if !is_viewer {
            self.update_feed(node_id);
            return;
        }
        // We moved, so every streaming peer is seen under a new angle
        for peer_id in replica.streaming_peer_ids() {
            self.update_feed(&peer_id);
        }
    }

    /// Recompute which feed of `peer_id` we should see, and publish a change
    fn update_feed(&mut self, peer_id: &str) {
        let viewer_id = self.state.viewer_id.clone();
        let Some(replica) = self.state.active_replica_mut() else {
            return;
        };

        let Some(viewer_pose) = replica.viewer().and_then(|v| v.pose) else {
            let e = AppError::MissingReference("own pose".to_string());
            debug!("Skipping feed selection for {}: {}", peer_id, e);
            return;
        };
        let Ok(peer) = replica.peer_mut(peer_id) else {
            return;
        };
        let Some(peer_pose) = peer.pose else {
            return;
        };
        let feeds = peer.feed_ids();
        let angle = geometry::viewing_angle(viewer_pose.xy(), peer_pose.xy(), peer_pose.yaw());
        let Some(index) = geometry::select_sector(angle, feeds.len()) else {
            return;
        };

        let feed = feeds[index].clone();
        if peer.current_feed.as_deref() == Some(feed.as_str()) {
            return;
        }
        peer.current_feed = Some(feed.clone());
        let session_id = replica.session_id.clone();

        debug!(
            "Seeing {} under {:.1} degrees, showing feed {} ({})",
            peer_id,
            angle,
            index + 1,
            feed
        );
        if let Err(e) = self.send_to_session(|paths| {
            vec![paths.set_state_set(peer_id, &viewer_id, &feed).into()]
        }) {
            warn!("Could not publish feed for {}: {}", peer_id, e);
        }
        self.events.publish(EngineEvent::FeedSelected {
            session_id,
            peer_id: peer_id.to_string(),
            feed_id: feed,
            angle,
        });
    }

    pub(super) fn publish_snapshot(&self) {
        let mut text = String::new();
        let _ = writeln!(text, "Known sessions: {}", self.state.registry.ids().join(", "));
        let _ = writeln!(text, "State: {}", self.state.controller);
        match self.state.active_replica() {
            Some(replica) => text.push_str(&replica.render()),
            None => text.push_str("Not joined\n"),
        }
        self.events.publish(EngineEvent::Snapshot {
            text,
            timestamp: Utc::now(),
        });
    }
}
