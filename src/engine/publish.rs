//! Outbound scene messages

use crate::osc::{OscMessage, OscPacket};
use crate::osc_msg;

/// Node type of the billboard that shows a remote peer's video
const PROXY_NODE_TYPE: &str = "ShapeNode";

/// State set type backed by a shared memory video
const SHARED_TEXTURE_TYPE: &str = "SharedVideoTexture";

/// Name of the proxy billboard through which `viewer` sees `peer`
pub fn proxy_name(peer: &str, viewer: &str) -> String {
    format!("{}-seenby-{}", peer, viewer)
}

/// Address builder for one session
#[derive(Debug, Clone, Copy)]
pub struct ScenePaths<'a> {
    pub root: &'a str,
    pub session_id: &'a str,
}

impl<'a> ScenePaths<'a> {
    pub fn new(root: &'a str, session_id: &'a str) -> Self {
        Self { root, session_id }
    }

    pub fn session(&self) -> String {
        format!("{}/{}", self.root, self.session_id)
    }

    pub fn node(&self, node_id: &str) -> String {
        format!("{}/{}/{}", self.root, self.session_id, node_id)
    }

    /// Create our own node, publish our attributes and our shared textures
    pub fn presence(
        &self,
        viewer: &str,
        peer_type: &str,
        attributes: &[(String, String)],
        texture_ids: &[String],
    ) -> Vec<OscPacket> {
        let mut packets: Vec<OscPacket> = Vec::new();
        packets.push(osc_msg!(self.session(), "createNode", viewer, peer_type).into());

        let viewer_path = self.node(viewer);
        for (key, value) in attributes {
            packets.push(osc_msg!(viewer_path.as_str(), "setParam", key, value).into());
        }

        for texture in texture_ids {
            packets.push(
                osc_msg!(self.session(), "createStateSet", texture, SHARED_TEXTURE_TYPE).into(),
            );
            packets.push(osc_msg!(self.node(texture), "setTextureID", texture).into());
        }
        packets
    }

    /// Create a newly sighted peer's node and the billboard only we see
    pub fn proxy_creation(&self, peer: &str, peer_type: &str, viewer: &str) -> Vec<OscPacket> {
        let proxy = proxy_name(peer, viewer);
        let proxy_path = self.node(&proxy);
        let setup: Vec<OscPacket> = vec![
            osc_msg!(proxy_path.as_str(), "setParent", peer),
            osc_msg!(proxy_path.as_str(), "setTranslation", 0.0f32, 0.0f32, 1.5f32),
            osc_msg!(proxy_path.as_str(), "setOrientation", 0.0f32, 0.0f32, 180.0f32),
            osc_msg!(proxy_path.as_str(), "setBillboard", 0.0f32),
            osc_msg!(proxy_path.as_str(), "setScale", 2.666f32, 1.0f32, 2.0f32),
            osc_msg!(proxy_path.as_str(), "setShape", 6.0f32),
            osc_msg!(proxy_path.as_str(), "setLighting", 0.0f32),
            osc_msg!(proxy_path.as_str(), "setContext", viewer),
        ]
        .into_iter()
        .map(OscPacket::from)
        .collect();

        vec![
            osc_msg!(self.session(), "createNode", peer, peer_type).into(),
            osc_msg!(self.session(), "createNode", proxy.as_str(), PROXY_NODE_TYPE).into(),
            OscPacket::Bundle(setup),
        ]
    }

    /// Show `feed` on the proxy of `peer`
    pub fn set_state_set(&self, peer: &str, viewer: &str, feed: &str) -> OscMessage {
        osc_msg!(self.node(&proxy_name(peer, viewer)), "setStateSet", feed)
    }

    pub fn ping(&self, viewer: &str) -> OscMessage {
        osc_msg!(self.node(viewer), "ping")
    }

    pub fn set_yaw(&self, viewer: &str, yaw: f32) -> OscMessage {
        osc_msg!(self.node(viewer), "setOrientation", 0.0f32, 0.0f32, yaw)
    }

    /// Session-wide method without arguments, e.g. `refresh`
    pub fn session_method(&self, method: &str) -> OscMessage {
        osc_msg!(self.session(), method)
    }
}
