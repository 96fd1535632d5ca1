use std::fmt;

/// Negotiation progress of one session, as observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Idle,
    /// Initiator is creating and applying its offer
    Offering,
    /// Responder waiting for the first offer
    AwaitingOffer,
    /// At least one description applied; connectivity not yet confirmed
    Negotiating,
    Connected,
    Failed,
    /// Torn down by the host or by the engine
    Closed,
}

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Failed | NegotiationState::Closed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::Offering => "offering",
            NegotiationState::AwaitingOffer => "awaiting-offer",
            NegotiationState::Negotiating => "negotiating",
            NegotiationState::Connected => "connected",
            NegotiationState::Failed => "failed",
            NegotiationState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Connection state reported by the transport engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}
