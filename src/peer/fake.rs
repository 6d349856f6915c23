//! Scriptable media stack for exercising the session core without devices.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::CallConfig;
use crate::error::{CallError, MediaError, Result};
use crate::peer::media::{LocalStream, MediaStack, PeerConnection, PeerEvent, PeerEventSender};
use crate::peer::types::{Candidate, MediaConstraints, MediaKind, SessionDescription};

/// Everything the fake observed, shared with the test.
#[derive(Default)]
pub(crate) struct FakeProbe {
    acquired: AtomicUsize,
    stopped: AtomicUsize,
    closed: AtomicUsize,
    remote_descriptions: Mutex<Vec<SessionDescription>>,
    local_descriptions: Mutex<Vec<SessionDescription>>,
    remote_candidates: Mutex<Vec<Candidate>>,
    muted: Mutex<Vec<MediaKind>>,
    events: Mutex<Option<PeerEventSender>>,
}

impl FakeProbe {
    pub(crate) fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Every `stop` call, repeats included.
    pub(crate) fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Every `close` call, repeats included.
    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote_descriptions.lock().clone()
    }

    pub(crate) fn local_descriptions(&self) -> Vec<SessionDescription> {
        self.local_descriptions.lock().clone()
    }

    pub(crate) fn remote_candidates(&self) -> Vec<Candidate> {
        self.remote_candidates.lock().clone()
    }

    pub(crate) fn is_muted(&self, kind: MediaKind) -> bool {
        self.muted.lock().contains(&kind)
    }

    /// Fires a connection callback. Returns `false` before a connection exists
    /// or after the session stopped listening.
    pub(crate) fn emit(&self, event: PeerEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

pub(crate) struct FakeMediaStack {
    probe: Arc<FakeProbe>,
    deny: Option<MediaError>,
}

impl FakeMediaStack {
    pub(crate) fn new() -> Self {
        Self {
            probe: Arc::new(FakeProbe::default()),
            deny: None,
        }
    }

    pub(crate) fn denying(error: MediaError) -> Self {
        Self {
            deny: Some(error),
            ..Self::new()
        }
    }

    pub(crate) fn probe(&self) -> Arc<FakeProbe> {
        Arc::clone(&self.probe)
    }
}

pub(crate) struct FakeStream {
    probe: Arc<FakeProbe>,
}

impl LocalStream for FakeStream {
    fn track_count(&self) -> usize {
        2
    }

    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool {
        let mut muted = self.probe.muted.lock();
        muted.retain(|k| *k != kind);
        if !enabled {
            muted.push(kind);
        }
        true
    }

    fn stop(&self) {
        self.probe.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeConnection {
    probe: Arc<FakeProbe>,
    remote: Mutex<Option<SessionDescription>>,
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0 fake-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        if self.remote.lock().is_none() {
            return Err(CallError::InvalidState("answer without remote offer".into()));
        }
        Ok(SessionDescription::answer("v=0 fake-answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.probe.local_descriptions.lock().push(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut remote = self.remote.lock();
        if remote.is_some() {
            // a real stack in stable state refuses a second answer
            return Err(CallError::InvalidState("remote description already set".into()));
        }
        *remote = Some(description.clone());
        self.probe.remote_descriptions.lock().push(description);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.remote.lock().is_some()
    }

    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<()> {
        if self.remote.lock().is_none() {
            return Err(CallError::InvalidState("candidate before remote description".into()));
        }
        self.probe.remote_candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // closing a real connection suspends; let concurrent callers run
        tokio::task::yield_now().await;
        self.probe.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MediaStack for FakeMediaStack {
    type Stream = FakeStream;
    type Connection = FakeConnection;

    async fn acquire_local_media(
        &self,
        _constraints: &MediaConstraints,
    ) -> std::result::Result<FakeStream, MediaError> {
        if let Some(err) = &self.deny {
            return Err(err.clone());
        }
        self.probe.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeStream {
            probe: Arc::clone(&self.probe),
        })
    }

    async fn create_connection(&self, _config: &CallConfig, events: PeerEventSender) -> Result<FakeConnection> {
        *self.probe.events.lock() = Some(events);
        Ok(FakeConnection {
            probe: Arc::clone(&self.probe),
            remote: Mutex::new(None),
        })
    }

    async fn add_local_tracks(&self, _connection: &FakeConnection, _stream: &FakeStream) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_release_calls_are_all_counted() {
        let stack = FakeMediaStack::new();
        let probe = stack.probe();
        let stream = stack.acquire_local_media(&MediaConstraints::default()).await.unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let connection = stack.create_connection(&CallConfig::default(), tx).await.unwrap();

        stream.stop();
        stream.stop();
        connection.close().await.unwrap();
        connection.close().await.unwrap();
        assert_eq!(probe.stopped(), 2);
        assert_eq!(probe.closed(), 2);
    }
}
