use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::record::{RecordCell, SignalingRecord};
use super::{CandidateStream, DescriptionStream, SignalingChannel};
use crate::error::{CallError, Result};
use crate::peer::types::{Candidate, Role, SessionDescription, SessionId};

/// Persisted-document signaling: a keyed store of shared records.
///
/// Cloning is cheap and every clone sees the same records, so two
/// participants in one process (or a test) share state the way two browsers
/// share a document database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<SessionId, Arc<RecordCell>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record. With a room name the call is create-if-absent
    /// and returns the name; without one a fresh opaque key is generated.
    pub fn create_session(&self, requested: Option<&str>) -> SessionId {
        let id = match requested {
            Some(name) => SessionId::new(name),
            None => SessionId::generate(),
        };
        let mut records = self.records.lock();
        if records.contains_key(&id) {
            debug!("Session {} already exists, joining", id);
        } else {
            info!("Created signaling record {}", id);
            records.insert(id.clone(), Arc::new(RecordCell::new()));
        }
        id
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.records.lock().contains_key(session_id)
    }

    pub fn snapshot(&self, session_id: &SessionId) -> Option<SignalingRecord> {
        self.records.lock().get(session_id).map(|cell| cell.snapshot())
    }

    fn record(&self, session_id: &SessionId) -> Result<Arc<RecordCell>> {
        self.records
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| CallError::SessionNotFound(session_id.clone()))
    }
}

#[async_trait]
impl SignalingChannel for MemoryStore {
    async fn claim_caller(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self.record(session_id)?.claim_caller())
    }

    async fn publish_description(&self, session_id: &SessionId, description: SessionDescription) -> Result<()> {
        let role = description.kind.publisher();
        if self.record(session_id)?.set_description(description) {
            debug!("Stored {} description for session {}", role, session_id);
            Ok(())
        } else {
            Err(CallError::AlreadyPublished {
                session_id: session_id.clone(),
                role,
            })
        }
    }

    async fn subscribe_remote_description(&self, session_id: &SessionId, role: Role) -> Result<DescriptionStream> {
        Ok(self.record(session_id)?.remote_descriptions(role))
    }

    async fn publish_candidate(&self, session_id: &SessionId, role: Role, candidate: Candidate) -> Result<()> {
        self.record(session_id)?.append_candidate(role, candidate);
        Ok(())
    }

    async fn subscribe_remote_candidates(&self, session_id: &SessionId, role: Role) -> Result<CandidateStream> {
        Ok(self.record(session_id)?.remote_candidates(role))
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        if self.records.lock().remove(session_id).is_some() {
            info!("Deleted signaling record {}", session_id);
        } else {
            debug!("Signaling record {} already gone", session_id);
        }
        Ok(())
    }
}
