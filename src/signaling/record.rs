use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;

use super::{CandidateStream, DescriptionStream};
use crate::peer::types::{Candidate, Role, SdpKind, SessionDescription};

/// Point-in-time copy of one session's shared signaling state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignalingRecord {
    pub caller_claimed: bool,
    pub offer: Option<SessionDescription>,
    pub answer: Option<SessionDescription>,
    pub caller_candidates: Vec<Candidate>,
    pub callee_candidates: Vec<Candidate>,
}

impl SignalingRecord {
    pub fn is_empty(&self) -> bool {
        !self.caller_claimed
            && self.offer.is_none()
            && self.answer.is_none()
            && self.caller_candidates.is_empty()
            && self.callee_candidates.is_empty()
    }

    pub fn description(&self, kind: SdpKind) -> Option<&SessionDescription> {
        match kind {
            SdpKind::Offer => self.offer.as_ref(),
            SdpKind::Answer => self.answer.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Document {
    caller_claimed: bool,
    offer: Option<SessionDescription>,
    answer: Option<SessionDescription>,
}

/// Live storage behind one record. The document and each candidate log are
/// separate watch channels, so subscribers of one are not woken by the
/// other. Dropping the cell ends every outstanding subscription.
#[derive(Debug)]
pub(crate) struct RecordCell {
    doc: watch::Sender<Document>,
    caller_candidates: watch::Sender<Vec<Candidate>>,
    callee_candidates: watch::Sender<Vec<Candidate>>,
}

impl RecordCell {
    pub(crate) fn new() -> Self {
        Self {
            doc: watch::channel(Document::default()).0,
            caller_candidates: watch::channel(Vec::new()).0,
            callee_candidates: watch::channel(Vec::new()).0,
        }
    }

    fn log(&self, role: Role) -> &watch::Sender<Vec<Candidate>> {
        match role {
            Role::Caller => &self.caller_candidates,
            Role::Callee => &self.callee_candidates,
        }
    }

    pub(crate) fn claim_caller(&self) -> bool {
        self.doc.send_if_modified(|doc| {
            if doc.caller_claimed || doc.offer.is_some() {
                false
            } else {
                doc.caller_claimed = true;
                true
            }
        })
    }

    /// Set-once write. Returns `false` when the slot was already taken.
    pub(crate) fn set_description(&self, description: SessionDescription) -> bool {
        self.doc.send_if_modified(|doc| {
            let slot = match description.kind {
                SdpKind::Offer => &mut doc.offer,
                SdpKind::Answer => &mut doc.answer,
            };
            if slot.is_some() {
                return false;
            }
            *slot = Some(description);
            true
        })
    }

    pub(crate) fn append_candidate(&self, role: Role, candidate: Candidate) {
        self.log(role).send_modify(|log| log.push(candidate));
    }

    pub(crate) fn candidates(&self, role: Role) -> Vec<Candidate> {
        self.log(role).borrow().clone()
    }

    pub(crate) fn snapshot(&self) -> SignalingRecord {
        let doc = self.doc.borrow().clone();
        SignalingRecord {
            caller_claimed: doc.caller_claimed,
            offer: doc.offer,
            answer: doc.answer,
            caller_candidates: self.candidates(Role::Caller),
            callee_candidates: self.candidates(Role::Callee),
        }
    }

    /// Yields the description `role`'s peer publishes, once per document
    /// change in which it is present.
    pub(crate) fn remote_descriptions(&self, role: Role) -> DescriptionStream {
        let kind = role.peer().publishes();
        stream::unfold((self.doc.subscribe(), false), move |(mut rx, delivered)| async move {
            if delivered && rx.changed().await.is_err() {
                return None;
            }
            loop {
                let found = rx.borrow_and_update().clone();
                let found = match kind {
                    SdpKind::Offer => found.offer,
                    SdpKind::Answer => found.answer,
                };
                if let Some(description) = found {
                    return Some((description, (rx, true)));
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        })
        .boxed()
    }

    /// Yields `role`'s peer candidates from the start of the log, then each
    /// new append.
    pub(crate) fn remote_candidates(&self, role: Role) -> CandidateStream {
        let rx = self.log(role.peer()).subscribe();
        stream::unfold((rx, 0usize), |(mut rx, next)| async move {
            loop {
                let item = rx.borrow_and_update().get(next).cloned();
                if let Some(candidate) = item {
                    return Some((candidate, (rx, next + 1)));
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        })
        .boxed()
    }
}
