use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::CallConfig;
use crate::error::{CallError, MediaError, Result};
use crate::peer::media::{LocalStream, MediaStack, PeerConnection, PeerEvent, PeerEventSender};
use crate::peer::types::{Candidate, ConnectivityState, MediaConstraints, MediaKind, SdpKind, SessionDescription};
use crate::utils::random_id;

/// Media stack backed by the `webrtc` crate.
///
/// Capture devices are outside this crate: local media is a pair of sample
/// tracks (Opus, VP8) the host feeds through [`RtcLocalStream::tracks`].
pub struct RtcMediaStack {
    api: API,
}

impl RtcMediaStack {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

/// Local sample tracks. Muting a kind drops its samples in
/// [`RtcLocalStream::write_sample`]; the track itself stays negotiated.
pub struct RtcLocalStream {
    stream_id: String,
    tracks: Mutex<Vec<(MediaKind, Arc<TrackLocalStaticSample>)>>,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    stopped: AtomicBool,
}

impl RtcLocalStream {
    /// Live tracks; empty once the stream is stopped.
    pub fn tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.tracks.lock().iter().map(|(_, track)| Arc::clone(track)).collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        self.enabled_flag(kind).load(Ordering::SeqCst)
    }

    fn enabled_flag(&self, kind: MediaKind) -> &AtomicBool {
        match kind {
            MediaKind::Audio => &self.audio_enabled,
            MediaKind::Video => &self.video_enabled,
        }
    }

    fn track(&self, kind: MediaKind) -> Option<Arc<TrackLocalStaticSample>> {
        self.tracks
            .lock()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, track)| Arc::clone(track))
    }

    /// Feeds one captured sample. Returns `false` when it was dropped because
    /// the kind is muted, absent or the stream is stopped.
    pub async fn write_sample(&self, kind: MediaKind, sample: &Sample) -> Result<bool> {
        if self.is_stopped() || !self.is_enabled(kind) {
            return Ok(false);
        }
        let Some(track) = self.track(kind) else {
            return Ok(false);
        };
        track.write_sample(sample).await?;
        Ok(true)
    }
}

impl LocalStream for RtcLocalStream {
    fn track_count(&self) -> usize {
        self.tracks.lock().len()
    }

    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool {
        if self.track(kind).is_none() {
            return false;
        }
        self.enabled_flag(kind).store(enabled, Ordering::SeqCst);
        info!("Local {} {}", kind, if enabled { "enabled" } else { "muted" });
        true
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let tracks = std::mem::take(&mut *self.tracks.lock());
        info!("Stopped {} local tracks of stream {}", tracks.len(), self.stream_id);
    }
}

pub struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaStack for RtcMediaStack {
    type Stream = RtcLocalStream;
    type Connection = RtcPeerConnection;

    async fn acquire_local_media(
        &self,
        constraints: &MediaConstraints,
    ) -> std::result::Result<RtcLocalStream, MediaError> {
        if !constraints.audio && !constraints.video {
            return Err(MediaError::NoDevice);
        }

        let stream_id = format!("ssc-{}", random_id());
        let mut tracks = Vec::new();

        if constraints.audio {
            tracks.push((MediaKind::Audio, Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48_000,
                    channels: 2,
                    ..Default::default()
                },
                "audio".to_owned(),
                stream_id.clone(),
            ))));
        }
        if constraints.video {
            tracks.push((MediaKind::Video, Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90_000,
                    ..Default::default()
                },
                "video".to_owned(),
                stream_id.clone(),
            ))));
        }

        info!("Acquired local stream {} with {} tracks", stream_id, tracks.len());
        Ok(RtcLocalStream {
            stream_id,
            tracks: Mutex::new(tracks),
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }

    async fn create_connection(
        &self,
        config: &CallConfig,
        events: PeerEventSender,
    ) -> Result<RtcPeerConnection> {
        let rtc_config = RTCConfiguration {
            ice_servers: config.rtc_ice_servers(),
            ice_candidate_pool_size: config.ice_candidate_pool_size,
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ..Default::default()
        };

        let pc = Arc::new(self.api.new_peer_connection(rtc_config).await?);

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => {
                            let _ = tx.send(PeerEvent::LocalCandidate(Candidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            }));
                        }
                        Err(e) => warn!("Failed to serialize local candidate: {}", e),
                    },
                    // None означает конец сбора кандидатов
                    None => {
                        let _ = tx.send(PeerEvent::GatheringComplete);
                    }
                }
            })
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        let tx = events.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let kind = track.kind().to_string();
            let id = track.id();
            info!("Remote {} track arrived: {}", kind, id);
            let _ = tx.send(PeerEvent::RemoteTrack { kind, id });
            Box::pin(async {})
        }));

        let tx = events;
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            let state = match st {
                RTCPeerConnectionState::New => Some(ConnectivityState::New),
                RTCPeerConnectionState::Connecting => Some(ConnectivityState::Connecting),
                RTCPeerConnectionState::Connected => Some(ConnectivityState::Connected),
                RTCPeerConnectionState::Disconnected => Some(ConnectivityState::Disconnected),
                RTCPeerConnectionState::Failed => Some(ConnectivityState::Failed),
                RTCPeerConnectionState::Closed => Some(ConnectivityState::Closed),
                _ => None,
            };
            if let Some(state) = state {
                debug!("Peer connection state changed to: {}", state);
                let _ = tx.send(PeerEvent::StateChanged(state));
            }
            Box::pin(async {})
        }));

        Ok(RtcPeerConnection { pc })
    }

    async fn add_local_tracks(&self, connection: &RtcPeerConnection, stream: &RtcLocalStream) -> Result<()> {
        for track in stream.tracks() {
            let sender = connection
                .pc
                .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
                .await?;

            // RTCP нужно вычитывать, иначе интерсепторы (NACK, отчёты) не работают
            tokio::spawn(async move {
                let mut rtcp_buf = vec![0u8; 1500];
                while sender.read(&mut rtcp_buf).await.is_ok() {}
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        other => {
            return Err(CallError::InvalidState(format!(
                "unexpected local description type {other}"
            )))
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp,
    })
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}
