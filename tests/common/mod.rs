//! Shared fixtures: an in-memory transport, a recording supervisor and a
//! harness that runs a real engine task against them.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;

use peerview::cameras::CameraSettings;
use peerview::config::AppConfig;
use peerview::engine::{Engine, EngineHandle, EngineStatus};
use peerview::events::{EngineEvent, EventBus};
use peerview::osc::{OscMessage, OscPacket};
use peerview::scene::PeerNode;
use peerview::supervisor::StreamSupervisor;
use peerview::transport::{
    delivery_channel, ChannelHandle, ChannelKind, Delivery, DeliverySender, Transport,
};
use peerview::{osc_msg, AppError, Result};

pub const SCENE_GROUP: Ipv4Addr = Ipv4Addr::new(239, 0, 0, 5);

/// Transport that records traffic instead of touching the network
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<(SocketAddr, OscPacket)>>,
    joined: Mutex<Vec<ChannelHandle>>,
    left: Mutex<Vec<ChannelHandle>>,
    next_id: AtomicU64,
    fail_scene_joins: AtomicBool,
    /// When set, scene joins wait for a permit
    gate: Mutex<Option<Arc<Semaphore>>>,
    waiting: AtomicUsize,
}

impl MockTransport {
    pub fn fail_scene_joins(&self, fail: bool) {
        self.fail_scene_joins.store(fail, Ordering::SeqCst);
    }

    /// Make scene joins block until the returned semaphore gets a permit
    pub fn gate_scene_joins(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn joins_waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn joined(&self) -> Vec<ChannelHandle> {
        self.joined.lock().clone()
    }

    pub fn left(&self) -> Vec<ChannelHandle> {
        self.left.lock().clone()
    }

    /// Latest scene binding that has not been left
    pub fn scene_handle(&self) -> Option<ChannelHandle> {
        let left = self.left.lock();
        self.joined
            .lock()
            .iter()
            .rev()
            .find(|h| h.kind == ChannelKind::Scene && !left.contains(h))
            .cloned()
    }

    pub fn sent_packets(&self) -> Vec<(SocketAddr, OscPacket)> {
        self.sent.lock().clone()
    }

    /// Every sent message, bundles flattened
    pub fn sent_messages(&self) -> Vec<OscMessage> {
        self.sent
            .lock()
            .iter()
            .flat_map(|(_, packet)| packet.clone().into_messages())
            .collect()
    }

    /// Sent messages whose first argument is `method`
    pub fn sent_with_method(&self, method: &str) -> Vec<OscMessage> {
        self.sent_messages()
            .into_iter()
            .filter(|m| m.str_arg(0).map(|s| s == method).unwrap_or(false))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn join(&self, kind: ChannelKind, group: Ipv4Addr, port: u16) -> Result<ChannelHandle> {
        if kind == ChannelKind::Scene {
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                self.waiting.fetch_add(1, Ordering::SeqCst);
                let permit = gate.acquire().await;
                self.waiting.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }
            if self.fail_scene_joins.load(Ordering::SeqCst) {
                return Err(AppError::BindError {
                    group,
                    port,
                    reason: "address in use".to_string(),
                });
            }
        }
        let handle = ChannelHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            kind,
            group,
            port,
        };
        self.joined.lock().push(handle.clone());
        Ok(handle)
    }

    async fn leave(&self, handle: &ChannelHandle) -> Result<()> {
        let mut left = self.left.lock();
        if !left.contains(handle) {
            left.push(handle.clone());
        }
        Ok(())
    }

    fn send(&self, dest: SocketAddr, packet: OscPacket) {
        self.sent.lock().push((dest, packet));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    Start(String),
    Stop(String),
}

/// Supervisor that only remembers what it was asked
#[derive(Default)]
pub struct RecordingSupervisor {
    calls: Mutex<Vec<SupervisorCall>>,
}

impl RecordingSupervisor {
    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.calls.lock().clone()
    }

    pub fn stops_for(&self, peer: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| **c == SupervisorCall::Stop(peer.to_string()))
            .count()
    }
}

#[async_trait]
impl StreamSupervisor for RecordingSupervisor {
    async fn start_streaming(&self, _session_id: &str, peer: &PeerNode) -> Result<()> {
        self.calls.lock().push(SupervisorCall::Start(peer.id.clone()));
        Ok(())
    }

    async fn stop_streaming(&self, _session_id: &str, peer_id: &str) -> Result<()> {
        self.calls.lock().push(SupervisorCall::Stop(peer_id.to_string()));
        Ok(())
    }
}

/// Config with timers slow enough to stay out of the way
pub fn test_config(user_id: &str) -> AppConfig {
    AppConfig {
        user_id: user_id.to_string(),
        keepalive_interval_secs: 3600,
        snapshot_interval_secs: 3600,
        ..Default::default()
    }
}

/// Local settings with `count` cameras on `host`
pub fn camera_settings(host: &str, count: usize) -> CameraSettings {
    CameraSettings {
        receiver_address: host.to_string(),
        cameras: (1..=count)
            .map(|i| format!("cam{}@{}:{}", i, host, 10000 + i * 10))
            .collect(),
        ..Default::default()
    }
}

/// `__server__` announcement for `session_id`, scene on `SCENE_GROUP:port`
pub fn announcement(session_id: &str, scene_port: u16) -> OscMessage {
    osc_msg!(
        "/SPIN/__server__",
        session_id,
        "239.0.0.1",
        54324,
        54324,
        SCENE_GROUP.to_string(),
        scene_port as i32,
        54325
    )
}

pub fn command_addr() -> SocketAddr {
    "239.0.0.1:54324".parse().unwrap()
}

/// setParam messages publishing `settings` for `peer` in `session`
pub fn attribute_messages(session: &str, peer: &str, settings: &CameraSettings) -> Vec<OscMessage> {
    let address = format!("/SPIN/{}/{}", session, peer);
    settings
        .to_attributes()
        .into_iter()
        .map(|(k, v)| osc_msg!(address.as_str(), "setParam", k, v))
        .collect()
}

pub struct Harness {
    pub handle: EngineHandle,
    pub transport: Arc<MockTransport>,
    pub supervisor: Arc<RecordingSupervisor>,
    pub events: broadcast::Receiver<EngineEvent>,
    deliveries: DeliverySender,
    task: JoinHandle<Result<()>>,
}

impl Harness {
    pub async fn start(config: AppConfig, local: CameraSettings) -> Self {
        let transport = Arc::new(MockTransport::default());
        let supervisor = Arc::new(RecordingSupervisor::default());
        let bus = EventBus::new();
        let events = bus.subscribe();
        let (deliveries, delivery_rx) = delivery_channel();

        let (engine, handle) = Engine::new(
            config,
            local,
            transport.clone(),
            supervisor.clone(),
            bus,
            delivery_rx,
        );
        let task = tokio::spawn(engine.run());

        Self {
            handle,
            transport,
            supervisor,
            events,
            deliveries,
            task,
        }
    }

    /// Engine for `user_id` already joined to `session`
    pub async fn joined(user_id: &str, local: CameraSettings, session: &str) -> Self {
        let harness = Self::start(test_config(user_id), local).await;
        harness.info(announcement(session, 54323)).await;
        harness.handle.switch_to(session).await.unwrap();
        harness
    }

    pub async fn info(&self, message: OscMessage) {
        self.deliver(ChannelKind::Info, 0, message).await;
    }

    /// Deliver on the current scene binding
    pub async fn scene(&self, message: OscMessage) {
        let id = self.transport.scene_handle().map(|h| h.id).unwrap_or(0);
        self.deliver(ChannelKind::Scene, id, message).await;
    }

    pub async fn scene_on(&self, handle_id: u64, message: OscMessage) {
        self.deliver(ChannelKind::Scene, handle_id, message).await;
    }

    async fn deliver(&self, channel: ChannelKind, handle_id: u64, message: OscMessage) {
        self.deliveries
            .send(Delivery {
                channel,
                handle_id,
                message,
                sender: "10.0.0.99:5000".parse().unwrap(),
            })
            .await
            .unwrap();
    }

    /// Current state. Everything delivered before this call has been handled.
    pub async fn status(&self) -> EngineStatus {
        self.handle.status().await.unwrap()
    }

    pub fn peer(status: &EngineStatus, id: &str) -> Option<PeerNode> {
        status.replica.as_ref().and_then(|r| r.peer(id).cloned())
    }

    /// Drain events received so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn wait_for_event(&mut self, name: &str, timeout: Duration) -> Option<EngineEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Ok(event)) if event.event_name() == name => return Some(event),
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                _ => return None,
            }
        }
    }

    pub async fn stop(self) -> Result<()> {
        self.handle.shutdown();
        self.task.await.unwrap()
    }
}
