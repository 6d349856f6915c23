use std::sync::Arc;

use futures::StreamExt;
use once_cell::sync::OnceCell;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::logger::log_candidate;
use crate::peer::ice::{CandidateBuffer, RemoteCandidate};
use crate::peer::media::{LocalStream, MediaStack, PeerConnection, PeerEvent};
use crate::peer::state::SessionState;
use crate::peer::types::{Candidate, MediaKind, Role, SessionDescription, SessionId};
use crate::role::RoleResolver;
use crate::signaling::{CandidateStream, DescriptionStream, SignalingChannel};
use crate::teardown::{TeardownCoordinator, TeardownOutcome, TerminationReason};

struct SessionInner<M: MediaStack> {
    session_id: SessionId,
    role: OnceCell<Role>,
    teardown: TeardownCoordinator<M>,
}

impl<M: MediaStack> SessionInner<M> {
    fn state(&self) -> SessionState {
        self.teardown.state()
    }

    fn advance(&self, next: SessionState) -> bool {
        self.teardown.advance(next)
    }

    async fn fail(&self, err: &CallError) {
        match err {
            CallError::AlreadyPublished { .. } => {
                error!("Signaling contract violated in session {}: {}", self.session_id, err)
            }
            _ => error!("Session {} failed: {}", self.session_id, err),
        }
        self.teardown
            .terminate(TerminationReason::Fatal(err.to_string()))
            .await;
    }
}

/// One participant's call.
///
/// `start` runs role resolution, media acquisition and (for the caller) the
/// offer before returning; everything after that is driven by a background
/// task. Dropping the handle tears the session down.
pub struct CallSession<M: MediaStack> {
    inner: Arc<SessionInner<M>>,
    role: Role,
}

impl<M: MediaStack> CallSession<M> {
    pub async fn start(
        media: Arc<M>,
        channel: Arc<dyn SignalingChannel>,
        session_id: SessionId,
        config: &CallConfig,
    ) -> Result<Self> {
        let inner = Arc::new(SessionInner {
            session_id: session_id.clone(),
            role: OnceCell::new(),
            teardown: TeardownCoordinator::new(session_id, Arc::clone(&channel)),
        });

        match Self::setup(&inner, media.as_ref(), channel, config).await {
            Ok(driver) => {
                let role = driver.role;
                tokio::spawn(driver.run());
                Ok(Self { inner, role })
            }
            Err(e) => {
                inner.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn setup(
        inner: &Arc<SessionInner<M>>,
        media: &M,
        channel: Arc<dyn SignalingChannel>,
        config: &CallConfig,
    ) -> Result<SessionDriver<M>> {
        let id = &inner.session_id;

        inner.advance(SessionState::RoleResolving);
        let role = RoleResolver::resolve(channel.as_ref(), id, &inner.role).await?;

        inner.advance(SessionState::AcquiringMedia);
        let stream = Arc::new(media.acquire_local_media(&config.media).await?);
        debug!("Acquired local media with {} tracks", stream.track_count());
        if !inner.teardown.attach_media(Arc::clone(&stream)) {
            return Err(CallError::InvalidState("session terminated during setup".into()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(media.create_connection(config, events_tx).await?);
        if !inner.teardown.attach_connection(Arc::clone(&connection)) {
            connection.close().await?;
            return Err(CallError::InvalidState("session terminated during setup".into()));
        }
        media.add_local_tracks(&connection, &stream).await?;

        if role == Role::Caller {
            inner.advance(SessionState::CreatingOffer);
            let offer = connection.create_offer().await?;
            connection.set_local_description(offer.clone()).await?;
            channel.publish_description(id, offer).await?;
            info!("Published offer for session {}", id);
        }

        let remote_candidates = channel.subscribe_remote_candidates(id, role).await?;
        let remote_descriptions = channel.subscribe_remote_description(id, role).await?;
        inner.advance(match role {
            Role::Caller => SessionState::AwaitingAnswer,
            Role::Callee => SessionState::AwaitingOffer,
        });

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(publish_outgoing(
            Arc::clone(&channel),
            id.clone(),
            role,
            outgoing_rx,
            inner.teardown.cancellation(),
        ));

        Ok(SessionDriver {
            inner: Arc::clone(inner),
            role,
            connection,
            channel,
            buffer: CandidateBuffer::new(),
            remote_description: None,
            events: events_rx,
            remote_descriptions,
            remote_candidates,
            outgoing,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.teardown.watch_state()
    }

    /// Mutes or unmutes the microphone. No renegotiation takes place.
    pub fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        self.set_enabled(MediaKind::Audio, enabled)
    }

    /// Turns the camera off or back on. No renegotiation takes place.
    pub fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        self.set_enabled(MediaKind::Video, enabled)
    }

    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> Result<()> {
        let stream = self.inner.teardown.media().ok_or_else(|| {
            CallError::InvalidState(format!("session {} has no local media", self.inner.session_id))
        })?;
        if !stream.set_enabled(kind, enabled) {
            return Err(CallError::InvalidState(format!("no local {kind} track")));
        }
        Ok(())
    }

    pub async fn hangup(&self) -> TeardownOutcome {
        self.inner.teardown.terminate(TerminationReason::UserHangup).await
    }

    /// Resolves when the session has been torn down for any reason.
    pub async fn terminated(&self) -> TerminationReason {
        self.inner.teardown.terminated().await
    }
}

impl<M: MediaStack> Drop for CallSession<M> {
    fn drop(&mut self) {
        if self.inner.teardown.is_started() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    inner.teardown.terminate(TerminationReason::Disposed).await;
                });
            }
            Err(_) => warn!(
                "Session {} dropped outside a runtime, teardown skipped",
                self.inner.session_id
            ),
        }
    }
}

enum Outgoing {
    Candidate(Candidate),
    GatheringComplete,
}

/// Publishes local signaling in the order it was produced. Failures are
/// logged and do not stop the session.
async fn publish_outgoing(
    channel: Arc<dyn SignalingChannel>,
    session_id: SessionId,
    role: Role,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let result = match message {
            Outgoing::Candidate(candidate) => channel.publish_candidate(&session_id, role, candidate).await,
            Outgoing::GatheringComplete => channel.gathering_complete(&session_id, role).await,
        };
        if let Err(e) = result {
            warn!("Publishing to session {} failed: {}", session_id, e);
        }
    }
}

enum Step {
    Event(PeerEvent),
    Description(SessionDescription),
    Candidate(Candidate),
    Stop,
}

/// Serializes everything that happens to a session after setup: connection
/// callbacks and remote signaling are handled one at a time, in order.
struct SessionDriver<M: MediaStack> {
    inner: Arc<SessionInner<M>>,
    role: Role,
    connection: Arc<M::Connection>,
    channel: Arc<dyn SignalingChannel>,
    buffer: CandidateBuffer,
    remote_description: Option<SessionDescription>,
    events: mpsc::UnboundedReceiver<PeerEvent>,
    remote_descriptions: DescriptionStream,
    remote_candidates: CandidateStream,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl<M: MediaStack> SessionDriver<M> {
    async fn run(mut self) {
        let cancel = self.inner.teardown.cancellation();
        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Stop,
                Some(event) = self.events.recv() => Step::Event(event),
                Some(description) = self.remote_descriptions.next() => Step::Description(description),
                Some(candidate) = self.remote_candidates.next() => Step::Candidate(candidate),
                else => Step::Stop,
            };
            let result = match step {
                Step::Stop => break,
                Step::Event(event) => self.on_peer_event(event).await,
                Step::Description(description) => self.on_remote_description(description).await,
                Step::Candidate(candidate) => self.on_remote_candidate(candidate).await,
            };
            if let Err(e) = result {
                self.inner.fail(&e).await;
                break;
            }
        }
        debug!("Driver for session {} stopped", self.inner.session_id);
    }

    async fn on_peer_event(&mut self, event: PeerEvent) -> Result<()> {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                log_candidate("LOCAL", &candidate);
                if self.buffer.record_local(candidate.clone()) {
                    let _ = self.outgoing.send(Outgoing::Candidate(candidate));
                }
            }
            PeerEvent::GatheringComplete => {
                if self.buffer.complete_gathering() {
                    let _ = self.outgoing.send(Outgoing::GatheringComplete);
                }
            }
            PeerEvent::RemoteTrack { kind, id } => {
                info!("Remote {} track {} arrived", kind, id);
                if self.inner.state() == SessionState::Connecting {
                    self.inner.advance(SessionState::Connected);
                    info!("Session {} connected", self.inner.session_id);
                }
            }
            PeerEvent::StateChanged(connectivity) => {
                info!("Connection state of session {}: {}", self.inner.session_id, connectivity);
                let state = self.inner.state();
                if connectivity.is_lost() && state.is_negotiated() {
                    warn!("Session {} lost connectivity ({})", self.inner.session_id, connectivity);
                    self.inner
                        .teardown
                        .terminate(TerminationReason::ConnectivityLost(connectivity))
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn on_remote_description(&mut self, description: SessionDescription) -> Result<()> {
        // persisted-канал повторяет описание при каждом изменении документа
        if self.remote_description.is_some() || self.connection.has_remote_description().await {
            debug!("Ignoring repeated remote {}", description.kind);
            return Ok(());
        }

        info!("Received remote {} for session {}", description.kind, self.inner.session_id);
        self.connection.set_remote_description(description.clone()).await?;
        self.remote_description = Some(description);

        let pending = self.buffer.remote_description_set();
        if !pending.is_empty() {
            debug!("Applying {} buffered remote candidates", pending.len());
        }
        for candidate in pending {
            self.apply_remote(candidate).await;
        }

        if self.role == Role::Callee {
            self.inner.advance(SessionState::CreatingAnswer);
            let answer = self.connection.create_answer().await?;
            self.connection.set_local_description(answer.clone()).await?;
            self.channel.publish_description(&self.inner.session_id, answer).await?;
            info!("Published answer for session {}", self.inner.session_id);
        }
        self.inner.advance(SessionState::Connecting);
        Ok(())
    }

    async fn on_remote_candidate(&mut self, candidate: Candidate) -> Result<()> {
        log_candidate("REMOTE", &candidate);
        match self.buffer.receive_remote(candidate) {
            RemoteCandidate::Apply(candidate) => self.apply_remote(candidate).await,
            RemoteCandidate::Buffered => debug!("Remote candidate buffered until the remote description is set"),
            RemoteCandidate::Duplicate => {}
        }
        Ok(())
    }

    async fn apply_remote(&mut self, candidate: Candidate) {
        if let Err(e) = self.connection.add_remote_candidate(candidate).await {
            warn!("Failed to add remote candidate: {}", e);
        }
    }
}
