//! Signaling channel: how offers, answers and candidates reach the peer.
//!
//! Two implementations share one contract. [`MemoryStore`] is the persisted
//! variant (a shared keyed record with two append-only candidate logs);
//! [`ManualChannel`] is the copy/paste variant where the operator carries
//! blobs between the two participants.

pub mod manual;
pub mod memory;
pub mod record;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::peer::types::{Candidate, Role, SessionDescription, SessionId};

pub use manual::{ManualChannel, Outbox, Pasted};
pub use memory::MemoryStore;
pub use record::SignalingRecord;

/// Peer descriptions as they become visible. May repeat a description that
/// was already delivered; consumers must apply only the first one.
pub type DescriptionStream = BoxStream<'static, SessionDescription>;

/// Peer candidates in append order, starting from the beginning of the log.
pub type CandidateStream = BoxStream<'static, Candidate>;

#[async_trait]
pub trait SignalingChannel: Send + Sync + 'static {
    /// Atomically claims the caller role. Succeeds only while the record has
    /// neither an offer nor an earlier claim. Fails with `SessionNotFound`
    /// when the record does not exist.
    async fn claim_caller(&self, session_id: &SessionId) -> Result<bool>;

    /// Sets the description of the role that publishes `description.kind`.
    /// A second publish for the same role fails with `AlreadyPublished`.
    async fn publish_description(&self, session_id: &SessionId, description: SessionDescription) -> Result<()>;

    /// Descriptions published by `role`'s peer. Each call starts a fresh
    /// subscription that replays the current value.
    async fn subscribe_remote_description(&self, session_id: &SessionId, role: Role) -> Result<DescriptionStream>;

    /// Appends to `role`'s candidate log. Duplicates are accepted.
    async fn publish_candidate(&self, session_id: &SessionId, role: Role, candidate: Candidate) -> Result<()>;

    /// Candidates appended by `role`'s peer, replayed from the start.
    async fn subscribe_remote_candidates(&self, session_id: &SessionId, role: Role) -> Result<CandidateStream>;

    /// `role` finished gathering local candidates.
    async fn gathering_complete(&self, _session_id: &SessionId, _role: Role) -> Result<()> {
        Ok(())
    }

    /// Purges everything stored for the session. Absent sessions are not an
    /// error.
    async fn delete_session(&self, session_id: &SessionId) -> Result<()>;
}
