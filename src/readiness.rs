//! Decides when a remote peer has published enough to stream with it

use std::collections::HashMap;

use crate::cameras::{camera_key, parse_count, CAMERA_COUNT_KEY, SETTING_KEYS};

/// What to do with a peer's streams after an attribute update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransition {
    Start,
    Stop,
    None,
}

/// Whether an attribute set is complete enough to start streaming
///
/// Every setting key must be present, `cameraCount` must parse, and
/// `camera[1]..=camera[cameraCount]` must all be present.
pub fn is_ready(attrs: &HashMap<String, String>) -> bool {
    if !SETTING_KEYS.iter().all(|key| attrs.contains_key(*key)) {
        return false;
    }
    match parse_count(attrs) {
        Ok(count) => (1..=count).all(|i| attrs.contains_key(&camera_key(i))),
        Err(_) => false,
    }
}

/// Attribute names still missing before the peer is ready
pub fn missing(attrs: &HashMap<String, String>) -> Vec<String> {
    let mut absent: Vec<String> = SETTING_KEYS
        .iter()
        .filter(|key| !attrs.contains_key(**key))
        .map(|key| key.to_string())
        .collect();

    match parse_count(attrs) {
        Ok(count) => {
            absent.extend(
                (1..=count)
                    .map(camera_key)
                    .filter(|key| !attrs.contains_key(key)),
            );
        }
        Err(_) => absent.push(CAMERA_COUNT_KEY.to_string()),
    }
    absent
}

/// Map readiness and the current streaming flag to a transition
pub fn evaluate(ready: bool, streaming: bool) -> StreamTransition {
    match (ready, streaming) {
        (true, false) => StreamTransition::Start,
        (false, true) => StreamTransition::Stop,
        _ => StreamTransition::None,
    }
}
