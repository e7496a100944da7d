//! OpenSoundControl messages as spoken on the info and scene channels
//!
//! Only the subset of OSC 1.0 the scene protocol uses is supported:
//! strings, 32-bit integers, 32-bit floats and (nested) bundles.

pub mod codec;
pub mod types;

pub use codec::{decode, encode};
pub use types::{OscArg, OscMessage, OscPacket};
