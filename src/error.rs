use thiserror::Error;

use crate::peer::types::{Role, SessionId};

/// Why local capture could not be started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to capture audio/video was denied")]
    PermissionDenied,

    #[error("no capture device matches the requested constraints")]
    NoDevice,

    #[error("media stack error: {0}")]
    Other(String),
}

/// Errors surfaced by the signaling core.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(#[from] MediaError),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// A role tried to publish its description a second time. This is a
    /// contract violation, never an expected runtime condition.
    #[error("{role} already published a description for session {session_id}")]
    AlreadyPublished { session_id: SessionId, role: Role },

    #[error("malformed remote input: {0}")]
    MalformedRemoteInput(String),

    #[error("webrtc error: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CallError>;
