pub mod connection;
pub mod engine;
pub mod ice;
pub mod media;
pub mod negotiator;
pub mod state;
pub mod types;

pub use connection::{WebRtcEngine, WebRtcEngineFactory};
pub use engine::{EngineEvent, EngineEvents, EngineFactory, TransportEngine};
pub use ice::CandidateBuffer;
pub use negotiator::{Event, Negotiator, NegotiatorHandle, OnRemoteTrackFn};
pub use state::{NegotiationState, PeerState};
pub use types::{Candidate, MediaKind, RemoteTrack, Role, SdpType, SessionDescription, TrackHandle};
