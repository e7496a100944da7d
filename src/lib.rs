//! peerview - shared scene tracking and camera feed selection
//!
//! Discovers sessions announced on a multicast info channel, keeps a replica
//! of the joined session's node directory, decides when a remote peer has
//! published enough to start streaming with it, and picks which of its
//! camera feeds faces us.

pub mod cameras;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geometry;
pub mod osc;
pub mod readiness;
pub mod registry;
pub mod scene;
pub mod supervisor;
pub mod transport;

pub use error::{AppError, Result};
