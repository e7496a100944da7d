//! Pipeline process manager

use std::collections::HashMap;
use std::net::IpAddr;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::commands::{commands_for_pair, PipelineCommand};
use super::StreamSupervisor;
use crate::cameras::CameraSettings;
use crate::error::Result;
use crate::scene::PeerNode;

/// One spawned pipeline
struct PipelineProcess {
    key: String,
    child: Child,
}

/// Spawns and kills the media pipelines for each streaming peer
///
/// ```
/// use peerview::cameras::CameraSettings;
/// use peerview::supervisor::ProcessSupervisor;
///
/// # tokio_test::block_on(async {
/// let supervisor = ProcessSupervisor::new("milhouse", CameraSettings::default());
/// assert!(supervisor.active_peers().await.is_empty());
/// # });
/// ```
pub struct ProcessSupervisor {
    program: String,
    local: CameraSettings,
    processes: Mutex<HashMap<String, Vec<PipelineProcess>>>,
}

impl ProcessSupervisor {
    pub fn new(program: impl Into<String>, local: CameraSettings) -> Self {
        Self {
            program: program.into(),
            local,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Peers with running pipelines
    pub async fn active_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.processes.lock().await.keys().cloned().collect();
        peers.sort();
        peers
    }

    fn spawn(&self, command: &PipelineCommand) -> std::io::Result<Child> {
        let mut cmd = match command.host.as_deref() {
            Some(host) if !is_local_host(host) => {
                let mut ssh = Command::new("ssh");
                ssh.arg(host).arg(command.command_line(&self.program));
                ssh
            }
            _ => {
                let mut local = Command::new(&self.program);
                local.args(&command.args);
                local
            }
        };

        let mut child = cmd
            .env("DISPLAY", &self.local.display)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(collect_logs(command.key.clone(), stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(collect_logs(command.key.clone(), stderr));
        }
        Ok(child)
    }
}

#[async_trait]
impl StreamSupervisor for ProcessSupervisor {
    async fn start_streaming(&self, session_id: &str, peer: &PeerNode) -> Result<()> {
        let remote = CameraSettings::from_attributes(&peer.attributes)?;
        let commands = commands_for_pair(&self.local, &remote, &peer.id);

        let mut processes = self.processes.lock().await;
        if processes.contains_key(&peer.id) {
            tracing::warn!("Pipelines for {} are already running", peer.id);
            return Ok(());
        }

        tracing::info!(
            "Starting {} pipelines with {} in session {}",
            commands.len(),
            peer.id,
            session_id
        );

        let mut started = Vec::with_capacity(commands.len());
        for command in &commands {
            tracing::debug!(
                "[{}] {} (on {})",
                command.key,
                command.command_line(&self.program),
                command.host.as_deref().unwrap_or("localhost")
            );
            match self.spawn(command) {
                Ok(child) => {
                    tracing::info!("Pipeline {} started with PID {:?}", command.key, child.id());
                    started.push(PipelineProcess {
                        key: command.key.clone(),
                        child,
                    });
                }
                Err(e) => tracing::warn!("Failed to start pipeline {}: {}", command.key, e),
            }
        }

        processes.insert(peer.id.clone(), started);
        Ok(())
    }

    async fn stop_streaming(&self, session_id: &str, peer_id: &str) -> Result<()> {
        let Some(pipelines) = self.processes.lock().await.remove(peer_id) else {
            tracing::debug!("No pipelines running for {}", peer_id);
            return Ok(());
        };

        tracing::info!(
            "Stopping {} pipelines with {} in session {}",
            pipelines.len(),
            peer_id,
            session_id
        );
        for mut pipeline in pipelines {
            if let Err(e) = pipeline.child.kill().await {
                tracing::warn!("Failed to kill {}: {}", pipeline.key, e);
            }
        }
        Ok(())
    }
}

/// Whether a camera host is this machine
fn is_local_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback();
    }
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .map_or(false, |name| name == host)
}

async fn collect_logs<R: tokio::io::AsyncRead + Unpin>(key: String, reader: R) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!("[{}] {}", key, line),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("[{}] Error reading log: {}", key, e);
                break;
            }
        }
    }
}
