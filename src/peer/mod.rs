pub mod codec;
pub mod connection;
pub mod ice;
pub mod media;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use codec::{ConnectionBundle, PastedBlob, SdpPayload};
pub use connection::{RtcLocalStream, RtcMediaStack, RtcPeerConnection};
pub use ice::CandidateBuffer;
pub use media::{LocalStream, MediaStack, PeerConnection, PeerEvent, PeerEventSender};
pub use state::SessionState;
pub use types::{
    Candidate, ConnectivityState, MediaConstraints, MediaKind, Role, SdpKind, SessionDescription, SessionId,
};
