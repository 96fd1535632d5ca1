//! Seam between the negotiator and whatever drives the actual peer connection.

use crate::error::Result;
use crate::peer::negotiator::Event;
use crate::peer::state::PeerState;
use crate::peer::types::{Candidate, MediaKind, Role, SessionDescription, TrackHandle};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Asynchronous notifications raised by an engine
pub enum EngineEvent {
    LocalCandidate(Candidate),
    /// End of local candidate gathering
    GatheringComplete,
    ConnectionState(PeerState),
    InboundTrack {
        mid: Option<String>,
        kind: MediaKind,
        track: TrackHandle,
    },
}

impl fmt::Debug for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            EngineEvent::GatheringComplete => f.write_str("GatheringComplete"),
            EngineEvent::ConnectionState(s) => f.debug_tuple("ConnectionState").field(s).finish(),
            EngineEvent::InboundTrack { mid, kind, .. } => f
                .debug_struct("InboundTrack")
                .field("mid", mid)
                .field("kind", kind)
                .finish_non_exhaustive(),
        }
    }
}

/// Sender handed to an engine at construction.
///
/// Every event is stamped with the session generation the engine was built
/// for, so the negotiator can discard anything raised after a teardown.
#[derive(Clone)]
pub struct EngineEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<Event>,
}

impl EngineEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { generation, tx }
    }

    /// Queues `event` for the negotiator. Returns false once it has gone away.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(Event::Engine {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Operations the negotiator needs from a peer-connection implementation.
#[async_trait]
pub trait TransportEngine: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Fails with `Error::InvalidCandidate` when the candidate cannot be used.
    async fn add_ice_candidate(&self, candidate: Candidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds one engine per session. Called when the initiator prepares or starts
/// a call, or when the responder receives its offer.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, role: Role, events: EngineEvents) -> Result<Arc<dyn TransportEngine>>;
}
