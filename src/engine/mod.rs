//! Session and state synchronization engine
//!
//! A single task owns [`EngineState`] and is the only caller into the
//! registry, the replica, the readiness negotiator and the geometry engine.
//! It multiplexes inbound deliveries, handle commands, the keepalive and
//! snapshot timers and the shutdown signal with `tokio::select!`.

mod handle;
mod handlers;
pub mod publish;
mod session;
mod state;

pub use handle::EngineHandle;
pub use state::{ControllerState, EngineState, EngineStatus};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use self::handle::EngineCommand;
use self::publish::ScenePaths;
use crate::cameras::CameraSettings;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::events::EventBus;
use crate::osc::OscPacket;
use crate::supervisor::StreamSupervisor;
use crate::transport::{ChannelHandle, ChannelKind, DeliveryReceiver, Transport};

/// Capacity of the handle command queue
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// The engine task
pub struct Engine {
    config: AppConfig,
    local: CameraSettings,
    transport: Arc<dyn Transport>,
    supervisor: Arc<dyn StreamSupervisor>,
    events: EventBus,
    state: EngineState,
    info_handle: Option<ChannelHandle>,
    scene_handle: Option<ChannelHandle>,
    deliveries: DeliveryReceiver,
    commands: mpsc::Receiver<EngineCommand>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Engine {
    /// Create an engine and its handle
    ///
    /// `deliveries` must be the receiving end of the queue `transport`
    /// delivers into.
    pub fn new(
        config: AppConfig,
        local: CameraSettings,
        transport: Arc<dyn Transport>,
        supervisor: Arc<dyn StreamSupervisor>,
        events: EventBus,
        deliveries: DeliveryReceiver,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let engine = Self {
            state: EngineState::new(config.user_id.clone()),
            config,
            local,
            transport,
            supervisor,
            events,
            info_handle: None,
            scene_handle: None,
            deliveries,
            commands: command_rx,
            shutdown_rx,
        };
        (engine, EngineHandle::new(command_tx, shutdown_tx))
    }

    /// Join the info channel
    ///
    /// Callers should treat failure as fatal.
    pub async fn bind_info(&mut self) -> Result<()> {
        if self.info_handle.is_some() {
            return Ok(());
        }
        let handle = self
            .transport
            .join(ChannelKind::Info, self.config.info_group, self.config.info_port)
            .await?;
        info!(
            "Listening for sessions on osc.udp://{}:{}",
            self.config.info_group, self.config.info_port
        );
        self.info_handle = Some(handle);
        Ok(())
    }

    /// Run until shutdown
    pub async fn run(mut self) -> Result<()> {
        self.bind_info().await?;

        let keepalive_period = Duration::from_secs(self.config.keepalive_interval_secs);
        let snapshot_period = Duration::from_secs(self.config.snapshot_interval_secs);
        let mut keepalive = interval_at(Instant::now() + keepalive_period, keepalive_period);
        let mut snapshot = interval_at(Instant::now() + snapshot_period, snapshot_period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        snapshot.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Engine running as {}", self.state.viewer_id);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    break;
                }

                Some(delivery) = self.deliveries.recv() => {
                    self.handle_delivery(delivery).await;
                }

                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }

                _ = keepalive.tick() => {
                    self.send_keepalive();
                }

                _ = snapshot.tick() => {
                    self.publish_snapshot();
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SwitchTo { session_id, reply } => {
                let result = self.switch_to(&session_id).await;
                match &result {
                    Err(e) if e.is_misuse() => debug!("Switch to {} rejected: {}", session_id, e),
                    Err(e) => warn!("Switch to {} failed: {}", session_id, e),
                    Ok(()) => {}
                }
                let _ = reply.send(result);
            }
            EngineCommand::Rotate { delta, reply } => {
                let _ = reply.send(self.rotate(delta));
            }
            EngineCommand::SessionMethod { method, reply } => {
                let _ = reply.send(self.send_session_method(method));
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(EngineStatus::capture(&self.state));
            }
        }
    }

    /// Where commands for the joined session go
    fn session_dest(&self) -> Result<(SocketAddr, &str)> {
        let session_id = self
            .state
            .current_session
            .as_deref()
            .ok_or(AppError::NotJoined)?;
        let info = self.state.registry.select(session_id)?;
        Ok((info.command_addr(), session_id))
    }

    fn paths<'a>(&'a self, session_id: &'a str) -> ScenePaths<'a> {
        ScenePaths::new(&self.config.osc_root, session_id)
    }

    /// Send packets to the joined session, in order
    fn send_to_session(&self, build: impl FnOnce(ScenePaths<'_>) -> Vec<OscPacket>) -> Result<()> {
        let (dest, session_id) = self.session_dest()?;
        for packet in build(self.paths(session_id)) {
            self.transport.send(dest, packet);
        }
        Ok(())
    }

    fn send_keepalive(&self) {
        if !self.state.is_joined() {
            return;
        }
        let viewer = self.state.viewer_id.as_str();
        if let Err(e) = self.send_to_session(|paths| vec![paths.ping(viewer).into()]) {
            debug!("Keepalive skipped: {}", e);
        }
    }

    fn rotate(&mut self, delta: f64) -> Result<f64> {
        if !self.state.is_joined() {
            return Err(AppError::NotJoined);
        }
        let yaw = crate::geometry::normalize_degrees(self.state.viewer_yaw + delta);
        self.state.viewer_yaw = yaw;
        let viewer = self.state.viewer_id.as_str();
        self.send_to_session(|paths| vec![paths.set_yaw(viewer, yaw as f32).into()])?;
        debug!("Rotated to {:.1} degrees", yaw);
        Ok(yaw)
    }

    fn send_session_method(&self, method: &str) -> Result<()> {
        self.send_to_session(|paths| vec![paths.session_method(method).into()])?;
        info!("Sent {} to the session", method);
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.teardown_session().await;
        if let Some(handle) = self.info_handle.take() {
            if let Err(e) = self.transport.leave(&handle).await {
                warn!("Failed to leave info channel: {}", e);
            }
        }
        info!("Engine stopped");
    }
}
