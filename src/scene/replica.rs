use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use tracing::{debug, info};

use crate::cameras::{camera_key, parse_count, CameraSpec};
use crate::error::{AppError, Result};

/// Position and orientation of a node. Only yaw matters for feed selection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: [f32; 3],
    /// Roll, pitch, yaw in degrees
    pub orientation: [f32; 3],
}

impl Pose {
    pub fn xy(&self) -> (f64, f64) {
        (self.position[0] as f64, self.position[1] as f64)
    }

    pub fn yaw(&self) -> f64 {
        self.orientation[2] as f64
    }
}

/// One participant of the joined session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeerNode {
    pub id: String,
    pub pose: Option<Pose>,
    /// Feed currently shown on this peer's proxy
    pub current_feed: Option<String>,
    pub attributes: HashMap<String, String>,
    /// True while media pipelines with this peer are up
    pub streaming: bool,
}

impl PeerNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Feed ids this peer offers, in camera index order
    ///
    /// Empty unless streaming. Cameras that do not parse are skipped.
    pub fn feed_ids(&self) -> Vec<String> {
        if !self.streaming {
            return Vec::new();
        }
        let count = match parse_count(&self.attributes) {
            Ok(count) => count,
            Err(_) => return Vec::new(),
        };
        (1..=count)
            .filter_map(|i| self.attributes.get(&camera_key(i)))
            .filter_map(|raw| raw.parse::<CameraSpec>().ok())
            .map(|spec| spec.texture_id())
            .collect()
    }
}

/// Local copy of one session's shared node directory
#[derive(Debug, Clone)]
pub struct SceneReplica {
    pub session_id: String,
    viewer_id: String,
    peer_type: String,
    /// Ids of non-peer nodes by type, as last advertised
    nodes_by_type: BTreeMap<String, Vec<String>>,
    /// Peers by id. Contains the viewer's own node.
    peers: BTreeMap<String, PeerNode>,
}

impl SceneReplica {
    /// Fresh replica holding only the viewer's own node
    pub fn new(session_id: &str, viewer_id: &str, peer_type: &str) -> Self {
        let mut peers = BTreeMap::new();
        peers.insert(viewer_id.to_string(), PeerNode::new(viewer_id));
        Self {
            session_id: session_id.to_string(),
            viewer_id: viewer_id.to_string(),
            peer_type: peer_type.to_string(),
            nodes_by_type: BTreeMap::new(),
            peers,
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn peer_type(&self) -> &str {
        &self.peer_type
    }

    pub fn peer(&self, id: &str) -> Option<&PeerNode> {
        self.peers.get(id)
    }

    pub fn peer_mut(&mut self, id: &str) -> Result<&mut PeerNode> {
        self.peers
            .get_mut(id)
            .ok_or_else(|| AppError::MissingReference(format!("peer {}", id)))
    }

    /// The viewer's own node
    pub fn viewer(&self) -> Option<&PeerNode> {
        self.peers.get(&self.viewer_id)
    }

    /// Every tracked node id, viewer included
    pub fn node_ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// Ids of remote peers, viewer excluded
    pub fn remote_peer_ids(&self) -> Vec<String> {
        self.peers
            .keys()
            .filter(|id| **id != self.viewer_id)
            .cloned()
            .collect()
    }

    /// Ids of remote peers that currently stream with us
    pub fn streaming_peer_ids(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|p| p.streaming && p.id != self.viewer_id)
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn nodes_of_type(&self, node_type: &str) -> &[String] {
        self.nodes_by_type
            .get(node_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Apply a `nodeList` announcement
    ///
    /// For the peer type only unseen ids are added and nothing is removed.
    /// Other types are replaced wholesale. Returns the newly sighted peers.
    pub fn apply_node_list(&mut self, node_type: &str, ids: &[String]) -> Vec<String> {
        if node_type != self.peer_type {
            debug!("{} nodes of type {}: {:?}", ids.len(), node_type, ids);
            self.nodes_by_type.insert(node_type.to_string(), ids.to_vec());
            return Vec::new();
        }

        let mut sighted = Vec::new();
        for id in ids {
            if id.is_empty() || self.peers.contains_key(id) {
                continue;
            }
            info!("New peer {} in session {}", id, self.session_id);
            self.peers.insert(id.clone(), PeerNode::new(id.as_str()));
            sighted.push(id.clone());
        }
        sighted
    }

    /// Remove a node from the type lists and, if it is a remote peer, from
    /// the peer table. The viewer's own node is never removed.
    ///
    /// Callers must stop streaming with the peer first.
    pub fn remove_node(&mut self, id: &str) -> Option<PeerNode> {
        for ids in self.nodes_by_type.values_mut() {
            ids.retain(|n| n != id);
        }
        if id == self.viewer_id {
            return None;
        }
        let removed = self.peers.remove(id);
        if removed.is_some() {
            info!("Peer {} left session {}", id, self.session_id);
        }
        removed
    }

    /// Last-write-wins attribute update. Returns whether the value changed.
    pub fn set_attribute(&mut self, peer_id: &str, key: &str, value: &str) -> Result<bool> {
        let peer = self.peer_mut(peer_id)?;
        match peer.attributes.insert(key.to_string(), value.to_string()) {
            Some(previous) if previous == value => Ok(false),
            Some(_) => {
                info!("Peer {}: {} changed to {}", peer_id, key, value);
                Ok(true)
            }
            None => {
                debug!("Peer {}: {} = {}", peer_id, key, value);
                Ok(true)
            }
        }
    }

    pub fn set_pose(&mut self, peer_id: &str, pose: Pose) -> Result<()> {
        self.peer_mut(peer_id)?.pose = Some(pose);
        Ok(())
    }

    /// Human-readable summary of the replica
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Session {} (viewer {})", self.session_id, self.viewer_id);
        let _ = writeln!(out, "{} nodes:", self.peer_type);
        for peer in self.peers.values() {
            let _ = write!(out, "  {}", peer.id);
            if peer.id == self.viewer_id {
                out.push_str(" (me)");
            }
            if peer.streaming {
                out.push_str(" [streaming]");
            }
            if let Some(feed) = &peer.current_feed {
                let _ = write!(out, " feed={}", feed);
            }
            if let Some(pose) = &peer.pose {
                let _ = write!(
                    out,
                    " pos=({:.2}, {:.2}, {:.2}) yaw={:.1}",
                    pose.position[0], pose.position[1], pose.position[2], pose.orientation[2]
                );
            }
            out.push('\n');

            let mut keys: Vec<&String> = peer.attributes.keys().collect();
            keys.sort();
            for key in keys {
                let _ = writeln!(out, "    {}={}", key, peer.attributes[key]);
            }
        }
        for (node_type, ids) in &self.nodes_by_type {
            let _ = writeln!(out, "{} nodes: {}", node_type, ids.join(", "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_replica_holds_only_viewer() {
        let replica = SceneReplica::new("s", "me", "Peer");
        assert_eq!(replica.node_ids(), ids(&["me"]));
        assert!(replica.remote_peer_ids().is_empty());
    }

    #[test]
    fn test_node_list_adds_but_never_removes_peers() {
        let mut replica = SceneReplica::new("s", "me", "Peer");
        let sighted = replica.apply_node_list("Peer", &ids(&["alice", "me", "bob"]));
        assert_eq!(sighted, ids(&["alice", "bob"]));

        let sighted = replica.apply_node_list("Peer", &ids(&["bob"]));
        assert!(sighted.is_empty());
        assert_eq!(replica.remote_peer_ids(), ids(&["alice", "bob"]));
    }

    #[test]
    fn test_node_list_replaces_other_types() {
        let mut replica = SceneReplica::new("s", "me", "Peer");
        replica.apply_node_list("ShapeNode", &ids(&["a", "b"]));
        replica.apply_node_list("ShapeNode", &ids(&["c"]));
        assert_eq!(replica.nodes_of_type("ShapeNode"), &ids(&["c"])[..]);
        assert!(replica.nodes_of_type("LightNode").is_empty());
    }

    #[test]
    fn test_remove_node() {
        let mut replica = SceneReplica::new("s", "me", "Peer");
        replica.apply_node_list("Peer", &ids(&["alice"]));
        replica.apply_node_list("ShapeNode", &ids(&["box", "alice-seenby-me"]));

        assert!(replica.remove_node("alice").is_some());
        assert!(replica.peer("alice").is_none());
        assert!(replica.remove_node("alice").is_none());

        assert!(replica.remove_node("box").is_none());
        assert_eq!(replica.nodes_of_type("ShapeNode"), &ids(&["alice-seenby-me"])[..]);

        // The viewer's own node survives
        assert!(replica.remove_node("me").is_none());
        assert!(replica.viewer().is_some());
    }

    #[test]
    fn test_set_attribute_reports_changes() {
        let mut replica = SceneReplica::new("s", "me", "Peer");
        replica.apply_node_list("Peer", &ids(&["alice"]));
        assert!(replica.set_attribute("alice", "width", "640").unwrap());
        assert!(!replica.set_attribute("alice", "width", "640").unwrap());
        assert!(replica.set_attribute("alice", "width", "320").unwrap());
        assert!(matches!(
            replica.set_attribute("carol", "width", "1"),
            Err(AppError::MissingReference(_))
        ));
    }

    #[test]
    fn test_feed_ids_follow_camera_order() {
        let mut peer = PeerNode::new("alice");
        peer.attributes.insert("cameraCount".into(), "2".into());
        peer.attributes.insert("camera[2]".into(), "b@host:2".into());
        peer.attributes.insert("camera[1]".into(), "a@host:1".into());
        assert!(peer.feed_ids().is_empty());

        peer.streaming = true;
        assert_eq!(
            peer.feed_ids(),
            vec!["peerview-a@host".to_string(), "peerview-b@host".to_string()]
        );
    }

    #[test]
    fn test_render_lists_peers_and_nodes() {
        let mut replica = SceneReplica::new("s", "me", "Peer");
        replica.apply_node_list("Peer", &ids(&["alice"]));
        replica.apply_node_list("ShapeNode", &ids(&["box"]));
        replica.set_attribute("alice", "width", "640").unwrap();
        let text = replica.render();
        assert!(text.contains("me (me)"));
        assert!(text.contains("width=640"));
        assert!(text.contains("ShapeNode nodes: box"));
    }
}
