use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::record::RecordCell;
use super::{CandidateStream, DescriptionStream, SignalingChannel};
use crate::error::{CallError, Result};
use crate::logger::log_candidate;
use crate::peer::codec::{self, ConnectionBundle, PastedBlob, SdpPayload};
use crate::peer::types::{Candidate, Role, SdpKind, SessionDescription, SessionId};

/// Blobs ready for the operator to copy to the other participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbox {
    /// Local offer or answer, available as soon as it is published.
    pub description: Option<String>,
    /// Full local candidate batch, available once gathering completes.
    pub candidates: Option<String>,
    /// Description and candidate batch together, once both exist.
    pub bundle: Option<String>,
}

/// What an auto-detected paste turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pasted {
    Description(SdpKind),
    Candidates(usize),
    Bundle(SdpKind, usize),
}

/// Out-of-band exchange: publishing fills the [`Outbox`], and the peer's
/// messages arrive through the `apply_pasted_*` calls.
///
/// The role is fixed at construction (`local` creates, `remote` joins).
/// Pasting the same blob twice is tolerated; keeping the order of pastes
/// sensible is up to the operator.
pub struct ManualChannel {
    session_id: SessionId,
    local_role: Role,
    record: Mutex<Option<Arc<RecordCell>>>,
    gathered: AtomicBool,
    outbox: watch::Sender<Outbox>,
}

impl ManualChannel {
    pub fn new(local_role: Role, session_id: SessionId) -> Self {
        info!("Manual signaling for session {} as {}", session_id, local_role);
        Self {
            session_id,
            local_role,
            record: Mutex::new(Some(Arc::new(RecordCell::new()))),
            gathered: AtomicBool::new(false),
            outbox: watch::channel(Outbox::default()).0,
        }
    }

    /// Creating side with a fresh session key.
    pub fn create() -> Self {
        Self::new(Role::Caller, SessionId::generate())
    }

    /// Joining side, seeded with the pasted offer (or offer bundle). The
    /// session key travels inside the blob.
    pub fn join(offer_blob: &str) -> Result<Self> {
        let pasted = codec::decode_any(offer_blob)?;
        let id = match &pasted {
            PastedBlob::Description(payload) => payload.id.clone(),
            PastedBlob::Bundle(bundle) => bundle.sdp_payload.id.clone(),
            PastedBlob::Candidates(_) => {
                return Err(CallError::MalformedRemoteInput(
                    "expected an offer, got a candidate batch".into(),
                ))
            }
        };
        let channel = Self::new(Role::Callee, id.unwrap_or_else(SessionId::generate));
        channel.apply_blob(pasted, Some(SdpKind::Offer))?;
        Ok(channel)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn local_role(&self) -> Role {
        self.local_role
    }

    pub fn outbox(&self) -> watch::Receiver<Outbox> {
        self.outbox.subscribe()
    }

    pub fn current_outbox(&self) -> Outbox {
        self.outbox.borrow().clone()
    }

    pub fn apply_pasted_offer(&self, blob: &str) -> Result<()> {
        self.apply_blob(codec::decode_any(blob)?, Some(SdpKind::Offer)).map(|_| ())
    }

    pub fn apply_pasted_answer(&self, blob: &str) -> Result<()> {
        self.apply_blob(codec::decode_any(blob)?, Some(SdpKind::Answer)).map(|_| ())
    }

    /// Returns how many candidates the batch contained.
    pub fn apply_pasted_candidates(&self, blob: &str) -> Result<usize> {
        let candidates = codec::decode_candidates(blob)?;
        self.apply_candidates(candidates)
    }

    /// Accepts whatever the peer exported: description, batch or bundle.
    pub fn apply_pasted(&self, blob: &str) -> Result<Pasted> {
        self.apply_blob(codec::decode_any(blob)?, None)
    }

    fn record(&self) -> Result<Arc<RecordCell>> {
        self.record
            .lock()
            .clone()
            .ok_or_else(|| CallError::SessionNotFound(self.session_id.clone()))
    }

    fn check_session(&self, session_id: &SessionId) -> Result<Arc<RecordCell>> {
        if *session_id != self.session_id {
            return Err(CallError::SessionNotFound(session_id.clone()));
        }
        self.record()
    }

    fn apply_blob(&self, pasted: PastedBlob, expected: Option<SdpKind>) -> Result<Pasted> {
        match pasted {
            PastedBlob::Description(payload) => {
                let kind = self.apply_description(payload, expected)?;
                Ok(Pasted::Description(kind))
            }
            PastedBlob::Bundle(bundle) => {
                let kind = self.apply_description(bundle.sdp_payload, expected)?;
                let count = self.apply_candidates(bundle.ice_candidates)?;
                Ok(Pasted::Bundle(kind, count))
            }
            PastedBlob::Candidates(candidates) if expected.is_none() => {
                Ok(Pasted::Candidates(self.apply_candidates(candidates)?))
            }
            PastedBlob::Candidates(_) => Err(CallError::MalformedRemoteInput(
                "expected a description, got a candidate batch".into(),
            )),
        }
    }

    fn apply_description(&self, payload: SdpPayload, expected: Option<SdpKind>) -> Result<SdpKind> {
        let kind = payload.description.kind;
        let wanted = self.local_role.peer().publishes();
        if kind != wanted || expected.is_some_and(|e| e != kind) {
            return Err(CallError::MalformedRemoteInput(format!(
                "a {} cannot accept a pasted {}",
                self.local_role, kind
            )));
        }
        if let Some(id) = &payload.id {
            if *id != self.session_id {
                warn!("Pasted {} belongs to session {}, expected {}", kind, id, self.session_id);
            }
        }
        if self.record()?.set_description(payload.description) {
            info!("Applied pasted {} for session {}", kind, self.session_id);
        } else {
            warn!("Pasted {} ignored, one was already applied", kind);
        }
        Ok(kind)
    }

    fn apply_candidates(&self, candidates: Vec<Candidate>) -> Result<usize> {
        let record = self.record()?;
        let count = candidates.len();
        for candidate in candidates {
            log_candidate("PASTED", &candidate);
            record.append_candidate(self.local_role.peer(), candidate);
        }
        debug!("Applied {} pasted candidates", count);
        Ok(count)
    }

    /// Recomputes the exportable blobs from the record.
    fn refresh_outbox(&self, record: &RecordCell) -> Result<()> {
        let snapshot = record.snapshot();
        let local = snapshot.description(self.local_role.publishes()).cloned();
        let candidates = match self.local_role {
            Role::Caller => snapshot.caller_candidates,
            Role::Callee => snapshot.callee_candidates,
        };
        let gathered = self.gathered.load(Ordering::SeqCst);

        let mut next = Outbox::default();
        if let Some(description) = &local {
            next.description = Some(codec::encode_description(description, &self.session_id)?);
        }
        if gathered {
            next.candidates = Some(codec::encode_candidates(&candidates)?);
            if let Some(description) = local {
                next.bundle = Some(codec::encode_bundle(&ConnectionBundle {
                    sdp_payload: SdpPayload::new(description, &self.session_id),
                    ice_candidates: candidates,
                })?);
            }
        }
        self.outbox.send_if_modified(|outbox| {
            if *outbox == next {
                false
            } else {
                *outbox = next;
                true
            }
        });
        Ok(())
    }
}

#[async_trait]
impl SignalingChannel for ManualChannel {
    async fn claim_caller(&self, session_id: &SessionId) -> Result<bool> {
        let record = self.check_session(session_id)?;
        Ok(self.local_role == Role::Caller && record.claim_caller())
    }

    async fn publish_description(&self, session_id: &SessionId, description: SessionDescription) -> Result<()> {
        let record = self.check_session(session_id)?;
        let role = description.kind.publisher();
        if role != self.local_role || !record.set_description(description) {
            return Err(CallError::AlreadyPublished {
                session_id: session_id.clone(),
                role,
            });
        }
        self.refresh_outbox(&record)
    }

    async fn subscribe_remote_description(&self, session_id: &SessionId, role: Role) -> Result<DescriptionStream> {
        Ok(self.check_session(session_id)?.remote_descriptions(role))
    }

    async fn publish_candidate(&self, session_id: &SessionId, role: Role, candidate: Candidate) -> Result<()> {
        let record = self.check_session(session_id)?;
        record.append_candidate(role, candidate);
        if self.gathered.load(Ordering::SeqCst) {
            // кандидат после конца сбора: обновляем экспорт
            self.refresh_outbox(&record)?;
        }
        Ok(())
    }

    async fn subscribe_remote_candidates(&self, session_id: &SessionId, role: Role) -> Result<CandidateStream> {
        Ok(self.check_session(session_id)?.remote_candidates(role))
    }

    async fn gathering_complete(&self, session_id: &SessionId, _role: Role) -> Result<()> {
        let record = self.check_session(session_id)?;
        self.gathered.store(true, Ordering::SeqCst);
        self.refresh_outbox(&record)
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        if *session_id != self.session_id {
            return Ok(());
        }
        if self.record.lock().take().is_some() {
            self.outbox.send_replace(Outbox::default());
            info!("Manual session {} discarded", self.session_id);
        }
        Ok(())
    }
}
