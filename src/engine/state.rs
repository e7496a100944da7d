use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::SessionRegistry;
use crate::scene::SceneReplica;

/// Session controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Joining,
    Joined,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Joining => write!(f, "joining"),
            ControllerState::Joined => write!(f, "joined"),
        }
    }
}

/// Everything the engine task owns
#[derive(Debug)]
pub struct EngineState {
    pub controller: ControllerState,
    /// `None` while not joined
    pub current_session: Option<String>,
    pub registry: SessionRegistry,
    /// Replica per session. Only the active session has one.
    pub replicas: HashMap<String, SceneReplica>,
    pub viewer_id: String,
    /// Yaw we last published for ourselves, in degrees
    pub viewer_yaw: f64,
}

impl EngineState {
    pub fn new(viewer_id: impl Into<String>) -> Self {
        Self {
            controller: ControllerState::Idle,
            current_session: None,
            registry: SessionRegistry::new(),
            replicas: HashMap::new(),
            viewer_id: viewer_id.into(),
            viewer_yaw: 0.0,
        }
    }

    pub fn active_replica(&self) -> Option<&SceneReplica> {
        self.current_session
            .as_ref()
            .and_then(|id| self.replicas.get(id))
    }

    pub fn active_replica_mut(&mut self) -> Option<&mut SceneReplica> {
        match self.current_session.as_ref() {
            Some(id) => self.replicas.get_mut(id),
            None => None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.controller == ControllerState::Joined
    }
}

/// Point-in-time copy of the engine state for callers outside the task
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub controller: ControllerState,
    pub current_session: Option<String>,
    pub sessions: Vec<String>,
    pub replica: Option<SceneReplica>,
    pub viewer_yaw: f64,
}

impl EngineStatus {
    pub(super) fn capture(state: &EngineState) -> Self {
        Self {
            controller: state.controller,
            current_session: state.current_session.clone(),
            sessions: state.registry.ids(),
            replica: state.active_replica().cloned(),
            viewer_yaw: state.viewer_yaw,
        }
    }
}
