//! Multicast transport for the info and scene channels
//!
//! The transport only knows how to join/leave a group, send a packet and
//! hand inbound messages to a registered receiver. It never retries: loss,
//! duplication and reordering are left for the upper layers to tolerate.

mod udp;

pub use udp::UdpTransport;

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::osc::{OscMessage, OscPacket};

/// Which logical channel a binding serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Session announcements
    Info,
    /// Traffic of the joined session
    Scene,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Info => write!(f, "info"),
            ChannelKind::Scene => write!(f, "scene"),
        }
    }
}

/// Opaque reference to a joined multicast group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: u64,
    pub kind: ChannelKind,
    pub group: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} osc.udp://{}:{}", self.kind, self.id, self.group, self.port)
    }
}

/// One inbound message. Bundles are flattened before delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub channel: ChannelKind,
    /// Id of the binding the datagram arrived on
    pub handle_id: u64,
    pub message: OscMessage,
    pub sender: SocketAddr,
}

/// Receiving end the engine drains
pub type DeliveryReceiver = mpsc::Receiver<Delivery>;

/// Sending end handed to a transport at construction
pub type DeliverySender = mpsc::Sender<Delivery>;

/// Capacity of the delivery queue between receive tasks and the engine
pub const DELIVERY_QUEUE_CAPACITY: usize = 1024;

/// Create the queue that connects a transport to the engine
pub fn delivery_channel() -> (DeliverySender, DeliveryReceiver) {
    mpsc::channel(DELIVERY_QUEUE_CAPACITY)
}

/// Multicast datagram transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Join `group:port`. Fails with `BindError` if the socket cannot be
    /// acquired.
    async fn join(&self, kind: ChannelKind, group: Ipv4Addr, port: u16) -> Result<ChannelHandle>;

    /// Leave a binding. Leaving twice is a no-op.
    async fn leave(&self, handle: &ChannelHandle) -> Result<()>;

    /// Queue a packet for `dest`. Never blocks the caller.
    fn send(&self, dest: SocketAddr, packet: OscPacket);
}
