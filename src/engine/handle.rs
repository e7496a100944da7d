use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::state::EngineStatus;
use crate::error::{AppError, Result};

/// Requests from handles to the engine task
pub(super) enum EngineCommand {
    SwitchTo {
        session_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Rotate {
        delta: f64,
        reply: oneshot::Sender<Result<f64>>,
    },
    SessionMethod {
        method: &'static str,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Cloneable control surface of a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    /// Set while a switch is in flight
    switching: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Clears the switching flag even if the caller drops the future
struct SwitchGuard<'a>(&'a AtomicBool);

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl EngineHandle {
    pub(super) fn new(
        commands: mpsc::Sender<EngineCommand>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            commands,
            switching: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Leave the current session and join `session_id`
    ///
    /// Fails fast with `SwitchInProgress` while another switch is running.
    pub async fn switch_to(&self, session_id: &str) -> Result<()> {
        if self
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Switch to {} rejected, another switch is running", session_id);
            return Err(AppError::SwitchInProgress);
        }
        let _guard = SwitchGuard(&self.switching);

        let session_id = session_id.to_string();
        self.request(|reply| EngineCommand::SwitchTo { session_id, reply })
            .await?
    }

    /// Whether a switch is in flight
    pub fn is_switching(&self) -> bool {
        self.switching.load(Ordering::SeqCst)
    }

    /// Turn ourselves by `delta` degrees. Returns the new yaw.
    pub async fn rotate(&self, delta: f64) -> Result<f64> {
        self.request(|reply| EngineCommand::Rotate { delta, reply })
            .await?
    }

    /// Ask the session to re-broadcast its whole state
    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| EngineCommand::SessionMethod {
            method: "refresh",
            reply,
        })
        .await?
    }

    /// Ask the session to clear its scene
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| EngineCommand::SessionMethod {
            method: "clear",
            reply,
        })
        .await?
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(|reply| EngineCommand::Status { reply }).await
    }

    /// Stop the engine. It tears down streaming and leaves every channel.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| AppError::Internal("engine is not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| AppError::Internal("engine stopped before replying".to_string()))
    }
}
