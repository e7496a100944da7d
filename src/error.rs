use std::net::Ipv4Addr;

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// A multicast socket could not be acquired. Fatal for the info channel,
    /// recoverable for a scene channel.
    #[error("Cannot bind multicast channel {group}:{port}: {reason}")]
    BindError {
        group: Ipv4Addr,
        port: u16,
        reason: String,
    },

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session {0} is already joined")]
    AlreadyJoined(String),

    #[error("A session switch is already in progress")]
    SwitchInProgress,

    #[error("Failed to join session {session_id}: {reason}")]
    JoinFailed { session_id: String, reason: String },

    #[error("Not joined to any session")]
    NotJoined,

    /// Missing or mistyped arguments in an inbound message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A lookup needed for an operation has nothing to point at
    #[error("Missing reference: {0}")]
    MissingReference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errors that come from caller misuse rather than from the network
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            AppError::UnknownSession(_) | AppError::AlreadyJoined(_) | AppError::SwitchInProgress
        )
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
