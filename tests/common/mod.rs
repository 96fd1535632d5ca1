#![allow(dead_code)]

use async_trait::async_trait;
use ssc_negotiator::error::{Error, Result};
use ssc_negotiator::peer::{
    Candidate, EngineEvent, EngineEvents, EngineFactory, NegotiationState, Negotiator,
    NegotiatorHandle, PeerState, Role, SdpType, SessionDescription, TransportEngine,
};
use ssc_negotiator::signaling::{decode, encode, MemoryChannel, Message, SignalingChannel};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:1\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:1\r\n";

/// Everything observable that happened, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    AddCandidate(String),
    Close,
    Sent(String),
    SentIce(String),
}

pub type OpLog = Arc<Mutex<Vec<Op>>>;

pub fn ops(log: &OpLog) -> Vec<Op> {
    log.lock().unwrap().clone()
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub reject_remote: bool,
    pub reject_local: bool,
    /// Candidates containing any of these strings fail to apply
    pub bad_candidates: Vec<String>,
}

pub struct MockEngine {
    log: OpLog,
    script: Script,
}

#[async_trait]
impl TransportEngine for MockEngine {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.log.lock().unwrap().push(Op::CreateOffer);
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.log.lock().unwrap().push(Op::CreateAnswer);
        Ok(SessionDescription::answer(ANSWER_SDP))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        if self.script.reject_local {
            return Err(Error::DescriptionRejected("local refused".into()));
        }
        self.log.lock().unwrap().push(Op::SetLocal(desc.sdp_type));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        if self.script.reject_remote {
            return Err(Error::DescriptionRejected("remote refused".into()));
        }
        self.log.lock().unwrap().push(Op::SetRemote(desc.sdp_type));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: Candidate) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Op::AddCandidate(candidate.candidate.clone()));
        if self
            .script
            .bad_candidates
            .iter()
            .any(|bad| candidate.candidate.contains(bad.as_str()))
        {
            return Err(Error::InvalidCandidate(candidate.candidate));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.lock().unwrap().push(Op::Close);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockFactory {
    log: OpLog,
    script: Script,
    events: Arc<Mutex<Vec<EngineEvents>>>,
}

impl MockFactory {
    pub fn new(log: OpLog, script: Script) -> Self {
        Self {
            log,
            script,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn engines_created(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Event sender of the most recently created engine
    pub fn events(&self) -> EngineEvents {
        self.events
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no engine created yet")
    }

    pub fn local_candidate(&self, candidate: Candidate) {
        assert!(self.events().emit(EngineEvent::LocalCandidate(candidate)));
    }

    pub fn peer_state(&self, state: PeerState) {
        assert!(self.events().emit(EngineEvent::ConnectionState(state)));
    }
}

#[async_trait]
impl EngineFactory for MockFactory {
    async fn create(&self, _role: Role, events: EngineEvents) -> Result<Arc<dyn TransportEngine>> {
        self.events.lock().unwrap().push(events);
        Ok(Arc::new(MockEngine {
            log: self.log.clone(),
            script: self.script.clone(),
        }))
    }
}

/// Signaling channel that records what was sent into the shared log and
/// forwards the frame to a memory endpoint.
pub struct RecordingChannel {
    log: OpLog,
    inner: MemoryChannel,
}

#[async_trait]
impl SignalingChannel for RecordingChannel {
    async fn send(&self, frame: String) -> Result<()> {
        let op = match decode(&frame)? {
            Message::Ice(c) => Op::SentIce(c.candidate),
            other => Op::Sent(other.kind().to_string()),
        };
        self.inner.send(frame).await?;
        self.log.lock().unwrap().push(op);
        Ok(())
    }
}

/// One negotiator wired to a mock engine and a recording channel
pub struct Side {
    pub negotiator: Negotiator,
    pub handle: NegotiatorHandle,
    pub factory: MockFactory,
    pub log: OpLog,
    /// Frames this side sent to its peer
    pub outbox: mpsc::UnboundedReceiver<String>,
}

impl Side {
    pub fn new(role: Role, script: Script) -> Self {
        let log: OpLog = Arc::new(Mutex::new(Vec::new()));
        let factory = MockFactory::new(log.clone(), script);
        let ((ours, _inbound), (_peer, outbox)) = MemoryChannel::pair();
        let channel = RecordingChannel {
            log: log.clone(),
            inner: ours,
        };
        let (negotiator, handle) = Negotiator::new(role, Arc::new(factory.clone()), Arc::new(channel));
        Self {
            negotiator,
            handle,
            factory,
            log,
            outbox,
        }
    }

    pub fn initiator() -> Self {
        Self::new(Role::Initiator, Script::default())
    }

    pub fn responder() -> Self {
        Self::new(Role::Responder, Script::default())
    }

    pub async fn step(&mut self) -> NegotiationState {
        self.negotiator.run_until_idle().await;
        self.negotiator.state()
    }

    pub fn deliver(&self, message: &Message) {
        self.handle
            .handle_inbound_message(encode(message).unwrap())
            .unwrap();
    }

    pub fn sent(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(frame) = self.outbox.try_recv() {
            out.push(decode(&frame).unwrap());
        }
        out
    }

    pub fn ops(&self) -> Vec<Op> {
        ops(&self.log)
    }
}

pub fn cand(n: u32) -> Candidate {
    Candidate::new(
        format!("candidate:{n} 1 udp 2130706431 192.168.1.{n} 5000{n} typ host"),
        "0",
        0,
    )
}

pub fn ice(n: u32) -> Message {
    Message::Ice(cand(n))
}

pub fn applied(ops: &[Op]) -> Vec<String> {
    ops.iter()
        .filter_map(|op| match op {
            Op::AddCandidate(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

pub fn sent_ice(ops: &[Op]) -> Vec<String> {
    ops.iter()
        .filter_map(|op| match op {
            Op::SentIce(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}
