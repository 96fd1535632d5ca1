//! JSON wire envelope: `{"type": "offer" | "answer" | "ice", "data": ...}`.
//!
//! An `ice` envelope with null data marks the end of the sender's candidates.

use crate::error::{Error, Result};
use crate::peer::types::{Candidate, SdpType, SessionDescription};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Ice(Candidate),
    /// Peer has no more candidates
    EndOfCandidates,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Offer(_) => "offer",
            Message::Answer(_) => "answer",
            Message::Ice(_) | Message::EndOfCandidates => "ice",
        }
    }
}

#[derive(Serialize)]
struct OutEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct InEnvelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

pub fn encode(message: &Message) -> Result<String> {
    let kind = message.kind();
    let frame = match message {
        Message::Offer(desc) | Message::Answer(desc) => {
            serde_json::to_string(&OutEnvelope { kind, data: desc })?
        }
        Message::Ice(candidate) => serde_json::to_string(&OutEnvelope {
            kind,
            data: candidate,
        })?,
        Message::EndOfCandidates => serde_json::to_string(&OutEnvelope {
            kind,
            data: &Value::Null,
        })?,
    };
    Ok(frame)
}

pub fn decode(frame: &str) -> Result<Message> {
    let envelope: InEnvelope = serde_json::from_str(frame)?;

    let kind = envelope
        .kind
        .ok_or_else(|| Error::MalformedMessage("missing type".into()))?;

    let data = |kind: &str| {
        envelope
            .data
            .clone()
            .filter(|d| !d.is_null())
            .ok_or_else(|| Error::MalformedMessage(format!("{kind} message without data")))
    };

    match kind.as_str() {
        "offer" => Ok(Message::Offer(description(SdpType::Offer, data("offer")?)?)),
        "answer" => Ok(Message::Answer(description(SdpType::Answer, data("answer")?)?)),
        "ice" => match envelope.data.clone().filter(|d| !d.is_null()) {
            Some(candidate) => Ok(Message::Ice(serde_json::from_value(candidate)?)),
            None => Ok(Message::EndOfCandidates),
        },
        other => Err(Error::MalformedMessage(format!(
            "unrecognized type {other:?}"
        ))),
    }
}

// Описание приходит либо объектом {type, sdp}, либо голой строкой SDP.
fn description(expected: SdpType, data: Value) -> Result<SessionDescription> {
    match data {
        Value::String(sdp) => Ok(SessionDescription {
            sdp_type: expected,
            sdp,
        }),
        other => {
            let desc: SessionDescription = serde_json::from_value(other)?;
            if desc.sdp_type != expected {
                return Err(Error::MalformedMessage(format!(
                    "{} envelope carries {} description",
                    expected.as_str(),
                    desc.sdp_type.as_str()
                )));
            }
            Ok(desc)
        }
    }
}
