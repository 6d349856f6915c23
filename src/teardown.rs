use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CallError;
use crate::peer::media::{LocalStream, MediaStack, PeerConnection};
use crate::peer::state::SessionState;
use crate::peer::types::{ConnectivityState, SessionId};
use crate::signaling::SignalingChannel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    UserHangup,
    /// The owner went away (handle dropped, process interrupted).
    Disposed,
    ConnectivityLost(ConnectivityState),
    Fatal(String),
}

impl TerminationReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, TerminationReason::ConnectivityLost(_) | TerminationReason::Fatal(_))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::UserHangup => f.write_str("user hangup"),
            TerminationReason::Disposed => f.write_str("disposed"),
            TerminationReason::ConnectivityLost(state) => write!(f, "connectivity {state}"),
            TerminationReason::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// This call performed the teardown.
    Completed,
    /// Another call got there first; it has finished by the time this returns.
    AlreadyTerminated,
}

/// Owns everything a session must release and releases it exactly once.
///
/// Resources are attached as setup progresses. `terminate` may race with
/// itself and with attachment: the first caller runs the steps, later callers
/// wait for it, and anything attached after termination started is released
/// on the spot. The coordinator also holds the session's observable state so
/// the terminal state is published before completion is reported.
pub struct TeardownCoordinator<M: MediaStack> {
    session_id: SessionId,
    channel: Arc<dyn SignalingChannel>,
    media: Mutex<Option<Arc<M::Stream>>>,
    connection: Mutex<Option<Arc<M::Connection>>>,
    started: AtomicBool,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    done: watch::Sender<Option<TerminationReason>>,
}

impl<M: MediaStack> TeardownCoordinator<M> {
    pub fn new(session_id: SessionId, channel: Arc<dyn SignalingChannel>) -> Self {
        Self {
            session_id,
            channel,
            media: Mutex::new(None),
            connection: Mutex::new(None),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            state: watch::channel(SessionState::Idle).0,
            done: watch::channel(None).0,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Moves along a legal non-terminal edge. Returns `false` (and changes
    /// nothing) otherwise. Only `terminate` enters `Closed` or `Failed`.
    pub fn advance(&self, next: SessionState) -> bool {
        if next.is_terminal() {
            debug!("Session {}: {} is reserved for teardown", self.session_id, next);
            return false;
        }
        self.transition(next)
    }

    fn transition(&self, next: SessionState) -> bool {
        let mut from = SessionState::Idle;
        let moved = self.state.send_if_modified(|state| {
            from = *state;
            if state.can_advance_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            debug!("Session {}: {} -> {}", self.session_id, from, next);
        } else {
            debug!("Session {}: ignored {} -> {}", self.session_id, from, next);
        }
        moved
    }

    /// Stops the driver loop when termination starts.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Local media while the session owns it.
    pub fn media(&self) -> Option<Arc<M::Stream>> {
        self.media.lock().clone()
    }

    /// Resolves once teardown has fully completed.
    pub async fn terminated(&self) -> TerminationReason {
        let mut rx = self.done.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return TerminationReason::Disposed;
            }
        }
    }

    /// Hands local media to the coordinator. Returns `false` when termination
    /// already started, in which case the stream has been stopped.
    pub fn attach_media(&self, stream: Arc<M::Stream>) -> bool {
        let mut slot = self.media.lock();
        if self.is_started() {
            drop(slot);
            stream.stop();
            return false;
        }
        *slot = Some(stream);
        true
    }

    /// Hands the connection to the coordinator. Returns `false` when
    /// termination already started; the caller must then close it.
    pub fn attach_connection(&self, connection: Arc<M::Connection>) -> bool {
        let mut slot = self.connection.lock();
        if self.is_started() {
            return false;
        }
        *slot = Some(connection);
        true
    }

    pub async fn terminate(&self, reason: TerminationReason) -> TeardownOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Session {} teardown already in progress ({})", self.session_id, reason);
            self.terminated().await;
            return TeardownOutcome::AlreadyTerminated;
        }

        info!("Tearing down session {}: {}", self.session_id, reason);
        self.cancel.cancel();

        // 1. локальные треки
        let stream = self.media.lock().take();
        if let Some(stream) = stream {
            stream.stop();
            debug!("Local media released");
        }

        // 2. соединение
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!("Closing connection of session {} failed: {}", self.session_id, e);
            }
        }

        // 3. общая запись сигнализации
        match self.channel.delete_session(&self.session_id).await {
            Ok(()) | Err(CallError::SessionNotFound(_)) => {}
            Err(e) => warn!("Purging session {} failed: {}", self.session_id, e),
        }

        // 4. итог
        let terminal = if reason.is_failure() {
            SessionState::Failed
        } else {
            SessionState::Closed
        };
        self.transition(terminal);
        self.done.send_replace(Some(reason));
        TeardownOutcome::Completed
    }
}
