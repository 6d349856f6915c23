use std::fmt;

/// Lifecycle of one call attempt.
///
/// `Closed` and `Failed` are terminal: once entered, no further transition
/// is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    RoleResolving,
    AcquiringMedia,
    CreatingOffer,
    AwaitingOffer,
    AwaitingAnswer,
    CreatingAnswer,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Whether the description exchange has finished on this side.
    pub fn is_negotiated(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }

    /// Forward edges of the state machine. Any non-terminal state may move to
    /// `Closed` or `Failed`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Closed | Failed) {
            return true;
        }
        matches!(
            (self, next),
            (Idle, RoleResolving)
                | (RoleResolving, AcquiringMedia)
                | (AcquiringMedia, CreatingOffer)
                | (AcquiringMedia, AwaitingOffer)
                | (CreatingOffer, AwaitingAnswer)
                | (AwaitingAnswer, Connecting)
                | (AwaitingOffer, CreatingAnswer)
                | (CreatingAnswer, Connecting)
                | (Connecting, Connected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;

    #[test]
    fn caller_and_callee_paths_are_accepted() {
        let caller = [Idle, RoleResolving, AcquiringMedia, CreatingOffer, AwaitingAnswer, Connecting, Connected, Closed];
        let callee = [Idle, RoleResolving, AcquiringMedia, AwaitingOffer, CreatingAnswer, Connecting, Connected, Failed];
        for path in [caller, callee] {
            for pair in path.windows(2) {
                assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn terminal_states_are_sticky() {
        assert!(!Closed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Closed));
        assert!(!Closed.can_advance_to(Connected));
    }

    #[test]
    fn skipping_negotiation_is_rejected() {
        assert!(!AwaitingAnswer.can_advance_to(Connected));
        assert!(!CreatingOffer.can_advance_to(Connecting));
        assert!(!Idle.can_advance_to(AcquiringMedia));
        assert!(AwaitingOffer.can_advance_to(Failed));
    }
}
