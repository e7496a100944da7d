//! Turns scene-channel messages into typed commands
//!
//! Addresses look like `<root>/<session>` for session-wide methods and
//! `<root>/<session>/<node>` for node methods. The first argument is always
//! the method name.

use super::replica::Pose;
use crate::error::{AppError, Result};
use crate::osc::{OscArg, OscMessage};

/// Node list value meaning "no nodes of this type"
const EMPTY_LIST_SENTINEL: &str = "NULL";

/// Parsed scene address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneAddress<'a> {
    pub session_id: &'a str,
    pub node_id: Option<&'a str>,
}

/// Split `<root>/<session>[/<node>]`. Anything else yields `None`.
pub fn parse_address<'a>(root: &str, address: &'a str) -> Option<SceneAddress<'a>> {
    let rest = address.strip_prefix(root)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let session_id = parts.next().filter(|s| !s.is_empty())?;
    let node_id = match parts.next() {
        Some(node) if !node.is_empty() => Some(node),
        Some(_) => return None,
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(SceneAddress {
        session_id,
        node_id,
    })
}

/// A scene-channel message the engine acts on
#[derive(Debug, Clone, PartialEq)]
pub enum SceneCommand {
    NodeList { node_type: String, ids: Vec<String> },
    DeleteNode { node_id: String },
    SetParam { node_id: String, key: String, value: String },
    Global6Dof { node_id: String, pose: Pose },
}

impl SceneCommand {
    /// Parse a message already known to target the active session
    ///
    /// Returns `Ok(None)` for methods we do not track.
    pub fn parse(address: &SceneAddress<'_>, msg: &OscMessage) -> Result<Option<Self>> {
        let method = msg.str_arg(0)?;

        let command = match (address.node_id, method) {
            (None, "nodeList") => {
                let node_type = msg.str_arg(1)?.to_string();
                let mut ids = Vec::with_capacity(msg.args.len().saturating_sub(2));
                for index in 2..msg.args.len() {
                    ids.push(msg.str_arg(index)?.to_string());
                }
                if ids.len() == 1 && ids[0] == EMPTY_LIST_SENTINEL {
                    ids.clear();
                }
                SceneCommand::NodeList { node_type, ids }
            }
            (None, "deleteNode") => SceneCommand::DeleteNode {
                node_id: msg.str_arg(1)?.to_string(),
            },
            (Some(node_id), "setParam") => {
                let key = msg.str_arg(1)?.to_string();
                let value = msg
                    .args
                    .get(2)
                    .map(value_string)
                    .ok_or_else(|| {
                        AppError::MalformedMessage(format!("{}: setParam without value", msg.address))
                    })?;
                SceneCommand::SetParam {
                    node_id: node_id.to_string(),
                    key,
                    value,
                }
            }
            (Some(node_id), "global6DOF") => {
                let mut values = [0.0f32; 6];
                for (i, slot) in values.iter_mut().enumerate() {
                    *slot = msg.f32_arg(i + 1)?;
                }
                SceneCommand::Global6Dof {
                    node_id: node_id.to_string(),
                    pose: Pose {
                        position: [values[0], values[1], values[2]],
                        orientation: [values[3], values[4], values[5]],
                    },
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

/// Attribute values are strings; numbers sent by other peers are rendered.
fn value_string(arg: &OscArg) -> String {
    match arg {
        OscArg::Str(s) => s.clone(),
        OscArg::Int(v) => v.to_string(),
        OscArg::Float(v) => v.to_string(),
    }
}
