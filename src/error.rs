//! Error taxonomy for negotiation, signaling and the engine adapter.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Frame could not be decoded into an envelope. Dropped, never terminal.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The engine refused an offer or answer. Terminal for the session.
    #[error("session description rejected: {0}")]
    DescriptionRejected(String),

    /// A single candidate could not be applied. Never terminal.
    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),

    /// Well-formed message that makes no sense in the current state.
    #[error("unexpected {kind} message in state {state}")]
    UnexpectedMessageType { kind: String, state: String },

    /// Signaling transport went away.
    #[error("signaling channel closed")]
    ChannelClosed,

    #[error("signaling transport error: {0}")]
    Signaling(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("room full")]
    RoomFull,

    #[error("transport engine error: {0}")]
    Engine(#[from] webrtc::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedMessage(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        match e {
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
            | tokio_tungstenite::tungstenite::Error::AlreadyClosed => Error::ChannelClosed,
            other => Error::Signaling(other.to_string()),
        }
    }
}
