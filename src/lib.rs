//! Two-party WebRTC call negotiation: offer/answer exchange over a signaling
//! relay with trickle-ICE candidate buffering.

pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::{NegotiatorConfig, ServerConfig};
pub use error::{Error, Result};
pub use peer::{
    Candidate, MediaKind, NegotiationState, Negotiator, NegotiatorHandle, RemoteTrack, Role,
    SessionDescription, WebRtcEngineFactory,
};
pub use signaling::{Message, SignalingChannel};
