use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::peer::types::Candidate;

/// What to do with a candidate received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCandidate {
    /// Remote description is set: hand it to the connection now.
    Apply(Candidate),
    /// Held until the remote description arrives.
    Buffered,
    /// Already seen; nothing to do.
    Duplicate,
}

/// Candidate bookkeeping for one session.
///
/// Local candidates are recorded once each. Remote candidates that arrive
/// before the remote description are queued and released in arrival order by
/// [`CandidateBuffer::remote_description_set`].
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    local: Vec<Candidate>,
    pending_remote: VecDeque<Candidate>,
    applied_remote: Vec<Candidate>,
    remote_ready: bool,
    gathering_complete: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a locally gathered candidate. Returns `false` for a repeat,
    /// which must not be published again.
    pub fn record_local(&mut self, candidate: Candidate) -> bool {
        if self.local.contains(&candidate) {
            debug!("Ignoring repeated local candidate: {}", candidate.candidate);
            return false;
        }
        self.local.push(candidate);
        true
    }

    /// Marks local gathering as finished. Only the first call returns `true`.
    pub fn complete_gathering(&mut self) -> bool {
        if self.gathering_complete {
            return false;
        }
        self.gathering_complete = true;
        info!("ICE gathering complete, {} local candidates", self.local.len());
        analyze_candidates(&self.local);
        true
    }

    pub fn receive_remote(&mut self, candidate: Candidate) -> RemoteCandidate {
        if self.applied_remote.contains(&candidate) || self.pending_remote.contains(&candidate) {
            return RemoteCandidate::Duplicate;
        }
        if self.remote_ready {
            self.applied_remote.push(candidate.clone());
            RemoteCandidate::Apply(candidate)
        } else {
            debug!(
                "Remote description not set yet, queuing candidate ({} pending)",
                self.pending_remote.len() + 1
            );
            self.pending_remote.push_back(candidate);
            RemoteCandidate::Buffered
        }
    }

    /// Switches to direct application and drains the queue in arrival order.
    pub fn remote_description_set(&mut self) -> Vec<Candidate> {
        self.remote_ready = true;
        let drained: Vec<Candidate> = self.pending_remote.drain(..).collect();
        self.applied_remote.extend(drained.iter().cloned());
        drained
    }

    pub fn local(&self) -> &[Candidate] {
        &self.local
    }

    pub fn pending_remote(&self) -> impl Iterator<Item = &Candidate> {
        self.pending_remote.iter()
    }

    pub fn is_gathering_complete(&self) -> bool {
        self.gathering_complete
    }
}

/// Logs how many host, server-reflexive and relay candidates were gathered.
pub fn analyze_candidates(candidates: &[Candidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    );

    if !candidates.is_empty() && relay_count == 0 {
        warn!("No TURN relay candidates found, connection through symmetric NAT may fail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(n: u32) -> Candidate {
        Candidate::new(format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"))
            .with_mid("0", 0)
    }

    #[test]
    fn early_candidates_flush_in_arrival_order() {
        let mut buffer = CandidateBuffer::new();
        for n in [3, 1, 2] {
            assert_eq!(buffer.receive_remote(cand(n)), RemoteCandidate::Buffered);
        }
        assert_eq!(buffer.pending_remote().count(), 3);

        let flushed = buffer.remote_description_set();
        assert_eq!(flushed, vec![cand(3), cand(1), cand(2)]);
        assert_eq!(buffer.pending_remote().count(), 0);

        assert_eq!(buffer.receive_remote(cand(4)), RemoteCandidate::Apply(cand(4)));
    }

    #[test]
    fn remote_candidates_are_applied_once() {
        let mut buffer = CandidateBuffer::new();
        assert_eq!(buffer.receive_remote(cand(1)), RemoteCandidate::Buffered);
        assert_eq!(buffer.receive_remote(cand(1)), RemoteCandidate::Duplicate);
        assert_eq!(buffer.remote_description_set(), vec![cand(1)]);
        assert_eq!(buffer.receive_remote(cand(1)), RemoteCandidate::Duplicate);
        assert!(buffer.remote_description_set().is_empty());
    }

    #[test]
    fn local_candidates_are_recorded_once() {
        let mut buffer = CandidateBuffer::new();
        assert!(buffer.record_local(cand(1)));
        assert!(!buffer.record_local(cand(1)));
        assert!(buffer.record_local(cand(2)));
        assert_eq!(buffer.local(), &[cand(1), cand(2)]);

        assert!(buffer.complete_gathering());
        assert!(!buffer.complete_gathering());
        assert!(buffer.is_gathering_complete());
    }
}
