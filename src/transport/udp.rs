//! UDP multicast transport
//!
//! Receive sockets are created through `nix` so that several processes on
//! the same host can listen to the same group and port (SO_REUSEADDR +
//! SO_REUSEPORT), then handed to tokio. Outbound packets go through a single
//! unbounded queue drained by one sender task, so `send` never blocks.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use nix::sys::socket::{
    self, sockopt, AddressFamily, IpMembershipRequest, SockFlag, SockProtocol, SockType,
    SockaddrIn,
};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChannelHandle, ChannelKind, Delivery, DeliverySender, Transport};
use crate::error::{AppError, Result};
use crate::osc::{self, OscPacket};

/// Largest datagram we accept
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Multicast transport over real UDP sockets
///
/// Must be created from within a tokio runtime.
pub struct UdpTransport {
    deliveries: DeliverySender,
    outbound_tx: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
    sender_task: JoinHandle<()>,
    receivers: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl UdpTransport {
    /// Create the transport and its outbound sender task
    ///
    /// `ttl` is applied to outgoing multicast datagrams.
    pub fn new(deliveries: DeliverySender, ttl: u32) -> Result<Self> {
        let std_socket = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
        let previous_ttl = std_socket.multicast_ttl_v4()?;
        std_socket.set_multicast_ttl_v4(ttl)?;
        std_socket.set_nonblocking(true)?;
        debug!("Sender socket TTL changed from {} to {}", previous_ttl, ttl);
        let send_socket = UdpSocket::from_std(std_socket)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let sender_task = tokio::spawn(send_loop(send_socket, outbound_rx));

        Ok(Self {
            deliveries,
            outbound_tx,
            sender_task,
            receivers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Number of live receive bindings
    pub fn binding_count(&self) -> usize {
        self.receivers.lock().len()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn join(&self, kind: ChannelKind, group: Ipv4Addr, port: u16) -> Result<ChannelHandle> {
        let bind_error = |e: io::Error| AppError::BindError {
            group,
            port,
            reason: e.to_string(),
        };

        if !group.is_multicast() {
            return Err(AppError::BindError {
                group,
                port,
                reason: "not a multicast address".to_string(),
            });
        }

        let std_socket = bind_multicast_socket(group, port).map_err(bind_error)?;
        let socket = UdpSocket::from_std(std_socket).map_err(bind_error)?;

        let handle = ChannelHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            group,
            port,
        };

        let task = tokio::spawn(receive_loop(
            socket,
            kind,
            handle.id,
            self.deliveries.clone(),
        ));
        self.receivers.lock().insert(handle.id, task);

        info!("Listening on {}", handle);
        Ok(handle)
    }

    async fn leave(&self, handle: &ChannelHandle) -> Result<()> {
        if let Some(task) = self.receivers.lock().remove(&handle.id) {
            task.abort();
            info!("Stopped listening on {}", handle);
        } else {
            debug!("Binding {} already left", handle);
        }
        Ok(())
    }

    fn send(&self, dest: SocketAddr, packet: OscPacket) {
        let bytes = osc::encode(&packet);
        if self.outbound_tx.send((dest, bytes)).is_err() {
            warn!("Sender task stopped, dropping packet for {}", dest);
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for (_, task) in self.receivers.lock().drain() {
            task.abort();
        }
        self.sender_task.abort();
    }
}

/// Bind a non-blocking UDP socket on `port` that is a member of `group`.
fn bind_multicast_socket(group: Ipv4Addr, port: u16) -> io::Result<std::net::UdpSocket> {
    let fd = socket::socket(
        AddressFamily::Inet,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC,
        SockProtocol::Udp,
    )
    .map_err(io::Error::from)?;

    // Several listeners on one host share the group
    socket::setsockopt(&fd, sockopt::ReuseAddr, &true).map_err(io::Error::from)?;
    socket::setsockopt(&fd, sockopt::ReusePort, &true).map_err(io::Error::from)?;

    let sockaddr = SockaddrIn::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket::bind(fd.as_raw_fd(), &sockaddr).map_err(io::Error::from)?;

    let membership = IpMembershipRequest::new(group, None);
    socket::setsockopt(&fd, sockopt::IpAddMembership, &membership).map_err(io::Error::from)?;
    socket::setsockopt(&fd, sockopt::IpMulticastLoop, &true).map_err(io::Error::from)?;

    let socket = std::net::UdpSocket::from(fd);
    socket.set_nonblocking(true)?;
    Ok(socket)
}

async fn receive_loop(
    socket: UdpSocket,
    kind: ChannelKind,
    handle_id: u64,
    deliveries: DeliverySender,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, sender) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("Receive error on {} channel: {}", kind, e);
                break;
            }
        };

        let packet = match osc::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping datagram from {} on {} channel: {}", sender, kind, e);
                continue;
            }
        };

        for message in packet.into_messages() {
            let delivery = Delivery {
                channel: kind,
                handle_id,
                message,
                sender,
            };
            if deliveries.send(delivery).await.is_err() {
                debug!("Delivery queue closed, stopping {} receiver", kind);
                return;
            }
        }
    }
}

async fn send_loop(
    socket: UdpSocket,
    mut outbound_rx: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
) {
    while let Some((dest, bytes)) = outbound_rx.recv().await {
        if let Err(e) = socket.send_to(&bytes, dest).await {
            warn!("Failed to send {} bytes to {}: {}", bytes.len(), dest, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::delivery_channel;

    #[tokio::test]
    async fn test_join_rejects_unicast_group() {
        let (tx, _rx) = delivery_channel();
        let transport = UdpTransport::new(tx, 1).unwrap();
        let result = transport
            .join(ChannelKind::Scene, Ipv4Addr::new(127, 0, 0, 1), 0)
            .await;
        assert!(matches!(result, Err(AppError::BindError { .. })));
        assert_eq!(transport.binding_count(), 0);
    }

    #[tokio::test]
    async fn test_leave_unknown_handle_is_noop() {
        let (tx, _rx) = delivery_channel();
        let transport = UdpTransport::new(tx, 1).unwrap();
        let handle = ChannelHandle {
            id: 42,
            kind: ChannelKind::Info,
            group: Ipv4Addr::new(239, 0, 0, 1),
            port: 54320,
        };
        assert!(transport.leave(&handle).await.is_ok());
        assert!(transport.leave(&handle).await.is_ok());
    }
}
