//! Seam between the signaling core and the host's real-time media stack.
//!
//! The core never touches codecs or sockets. It drives the control-plane
//! calls below and reacts to [`PeerEvent`]s delivered through the sender
//! handed to [`MediaStack::create_connection`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::CallConfig;
use crate::error::{MediaError, Result};
use crate::peer::types::{Candidate, ConnectivityState, MediaConstraints, MediaKind, SessionDescription};

/// Callbacks of the connection object, funnelled into the session's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    LocalCandidate(Candidate),
    GatheringComplete,
    RemoteTrack { kind: String, id: String },
    StateChanged(ConnectivityState),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// Captured local audio/video.
pub trait LocalStream: Send + Sync + 'static {
    fn track_count(&self) -> usize;

    /// Mutes or unmutes the tracks of `kind` without renegotiating. Returns
    /// `false` when the stream has no such track.
    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool;

    /// Stops every capture track.
    fn stop(&self);
}

#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn has_remote_description(&self) -> bool;

    /// Re-adding a candidate must be a no-op for the implementation.
    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait MediaStack: Send + Sync + 'static {
    type Stream: LocalStream;
    type Connection: PeerConnection;

    async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> std::result::Result<Self::Stream, MediaError>;

    async fn create_connection(
        &self,
        config: &CallConfig,
        events: PeerEventSender,
    ) -> Result<Self::Connection>;

    async fn add_local_tracks(&self, connection: &Self::Connection, stream: &Self::Stream) -> Result<()>;
}
