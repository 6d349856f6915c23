//! Signaling core for a two-party audio/video call.
//!
//! A participant joins a session through a [`SignalingChannel`], learns its
//! role, captures media, runs the offer/answer and trickle-ICE exchange and
//! tears everything down exactly once. The real-time stack sits behind
//! [`MediaStack`]; [`RtcMediaStack`] is the `webrtc` implementation.

pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod role;
pub mod session;
pub mod signaling;
pub mod teardown;
pub mod utils;

pub use config::{CallConfig, IceServerConfig};
pub use error::{CallError, MediaError, Result};
pub use peer::{
    Candidate, ConnectivityState, MediaKind, MediaStack, PeerEvent, RtcMediaStack, Role, SessionDescription, SessionId,
    SessionState,
};
pub use role::RoleResolver;
pub use session::CallSession;
pub use signaling::{ManualChannel, MemoryStore, Outbox, Pasted, SignalingChannel};
pub use teardown::{TeardownOutcome, TerminationReason};
