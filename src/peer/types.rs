use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Which side of the call this negotiator plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// Opaque negotiated-capabilities blob; carried verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE кандидат для WebRTC соединения
///
/// Field names follow the browser `RTCIceCandidateInit` JSON shape.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl Candidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: impl Into<String>, index: u16) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some(sdp_mid.into()),
            sdp_mline_index: Some(index),
            username_fragment: None,
        }
    }

    /// `typ` field of the candidate attribute, e.g. "host", "srflx", "relay".
    pub fn candidate_type(&self) -> Option<&str> {
        let mut parts = self.candidate.split_whitespace();
        while let Some(part) = parts.next() {
            if part == "typ" {
                return parts.next();
            }
        }
        None
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_media_name(name: &str) -> Option<Self> {
        match name {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Engine-owned track object; the host downcasts to the engine's track type.
pub type TrackHandle = Arc<dyn Any + Send + Sync>;

/// Inbound track routed to the host
#[derive(Clone)]
pub struct RemoteTrack {
    pub mid: String,
    pub kind: MediaKind,
    pub handle: TrackHandle,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("mid", &self.mid)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_type_is_read_from_typ_field() {
        let c = Candidate::new(
            "candidate:1 1 udp 2130706431 192.168.1.2 54321 typ host generation 0",
            "0",
            0,
        );
        assert_eq!(c.candidate_type(), Some("host"));

        let no_typ = Candidate::new("candidate:1 1 udp 1 10.0.0.1 9", "0", 0);
        assert_eq!(no_typ.candidate_type(), None);
    }

    #[test]
    fn candidate_uses_browser_field_names() {
        let c = Candidate::new("candidate:x", "1", 1);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["sdpMid"], "1");
        assert_eq!(json["sdpMLineIndex"], 1);
        assert!(json.get("usernameFragment").is_none());
    }
}
