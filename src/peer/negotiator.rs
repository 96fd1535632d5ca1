//! Offer/answer state machine with trickle-ICE buffering.
//!
//! A [`Negotiator`] owns one [`Session`] and processes every input for it on a
//! single queue: host commands, relay frames and engine callbacks. Engine
//! operations are awaited on that queue, so no two state mutations ever
//! overlap.
//!
//! Two gates decide what happens to candidates:
//!
//! - local candidates are sent only once our own description is applied;
//! - remote candidates are applied only once the peer's description is applied.
//!
//! Until its gate opens, each direction collects candidates in a
//! [`CandidateBuffer`]. Opening the gate drains the buffer in arrival order;
//! afterwards candidates are dispatched as they come.

use crate::error::{Error, Result};
use crate::logger::dump_candidate;
use crate::peer::engine::{EngineEvent, EngineEvents, EngineFactory, TransportEngine};
use crate::peer::ice::{analyze_candidates, CandidateBuffer, CandidateStats};
use crate::peer::media::MediaLines;
use crate::peer::state::{NegotiationState, PeerState};
use crate::peer::types::{Candidate, MediaKind, RemoteTrack, Role, SessionDescription, TrackHandle};
use crate::session::Session;
use crate::signaling::{codec, Message, SignalingChannel};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Everything a negotiator reacts to
#[derive(Debug)]
pub enum Event {
    /// Build the engine ahead of the call so candidate gathering can start
    Prepare,
    StartCall,
    /// Raw relay frame, decoded by the negotiator
    Inbound(String),
    Engine { generation: u64, event: EngineEvent },
    ChannelClosed,
    HangUp,
}

/// Host callback for inbound media
pub type OnRemoteTrackFn = Box<dyn FnMut(RemoteTrack) + Send + Sync>;

/// Cloneable host-side handle; every call just queues an event.
#[derive(Clone)]
pub struct NegotiatorHandle {
    tx: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<NegotiationState>,
}

impl NegotiatorHandle {
    pub fn prepare(&self) -> Result<()> {
        self.push(Event::Prepare)
    }

    pub fn start_call(&self) -> Result<()> {
        self.push(Event::StartCall)
    }

    pub fn handle_inbound_message(&self, frame: impl Into<String>) -> Result<()> {
        self.push(Event::Inbound(frame.into()))
    }

    pub fn channel_closed(&self) -> Result<()> {
        self.push(Event::ChannelClosed)
    }

    pub fn hang_up(&self) -> Result<()> {
        self.push(Event::HangUp)
    }

    /// Observable connection state
    pub fn state(&self) -> watch::Receiver<NegotiationState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    fn push(&self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::ChannelClosed)
    }
}

pub struct Negotiator {
    session: Session,
    factory: Arc<dyn EngineFactory>,
    engine: Option<Arc<dyn TransportEngine>>,
    channel: Arc<dyn SignalingChannel>,
    local_pending: CandidateBuffer,
    remote_pending: CandidateBuffer,
    media_lines: MediaLines,
    sent: CandidateStats,
    on_remote_track: Option<OnRemoteTrackFn>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    state_tx: watch::Sender<NegotiationState>,
}

impl Negotiator {
    pub fn new(
        role: Role,
        factory: Arc<dyn EngineFactory>,
        channel: Arc<dyn SignalingChannel>,
    ) -> (Self, NegotiatorHandle) {
        let session = Session::new(role);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(session.state);

        info!("[{}] New {} session", session.id, role);

        let handle = NegotiatorHandle {
            tx: events_tx.clone(),
            state: state_rx,
        };
        let negotiator = Self {
            session,
            factory,
            engine: None,
            channel,
            local_pending: CandidateBuffer::new(),
            remote_pending: CandidateBuffer::new(),
            media_lines: MediaLines::new(),
            sent: CandidateStats::default(),
            on_remote_track: None,
            events_tx,
            events_rx,
            state_tx,
        };
        (negotiator, handle)
    }

    pub fn initiator(
        factory: Arc<dyn EngineFactory>,
        channel: Arc<dyn SignalingChannel>,
    ) -> (Self, NegotiatorHandle) {
        Self::new(Role::Initiator, factory, channel)
    }

    pub fn responder(
        factory: Arc<dyn EngineFactory>,
        channel: Arc<dyn SignalingChannel>,
    ) -> (Self, NegotiatorHandle) {
        Self::new(Role::Responder, factory, channel)
    }

    pub fn on_remote_track(&mut self, f: OnRemoteTrackFn) {
        self.on_remote_track = Some(f);
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> NegotiationState {
        self.session.state
    }

    /// Processes events until the session fails or is closed.
    pub async fn run(mut self) -> NegotiationState {
        while !self.session.state.is_terminal() {
            match self.events_rx.recv().await {
                Some(event) => self.dispatch(event).await,
                None => break,
            }
        }
        info!("[{}] Negotiator stopped in state {}", self.session.id, self.session.state);
        self.session.state
    }

    /// Processes whatever is queued right now, including events queued while
    /// doing so, and returns once the queue is empty.
    pub async fn run_until_idle(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event).await;
        }
    }

    pub async fn dispatch(&mut self, event: Event) {
        if self.session.state.is_terminal() {
            debug!(
                "[{}] Session is {}, ignoring {:?}",
                self.session.id, self.session.state, event
            );
            return;
        }

        match event {
            Event::Prepare => self.prepare().await,
            Event::StartCall => self.start_call().await,
            Event::Inbound(frame) => self.handle_inbound_message(&frame).await,
            Event::Engine { generation, event } => {
                if generation != self.session.generation {
                    debug!(
                        "[{}] Dropping stale engine event from generation {}: {:?}",
                        self.session.id, generation, event
                    );
                    return;
                }
                self.handle_engine_event(event).await;
            }
            Event::ChannelClosed => self.fail(Error::ChannelClosed).await,
            Event::HangUp => {
                info!("[{}] Hang up requested", self.session.id);
                self.teardown(NegotiationState::Closed).await;
            }
        }
    }

    async fn prepare(&mut self) {
        if self.session.role != Role::Initiator || self.session.state != NegotiationState::Idle {
            debug!("[{}] Nothing to prepare in state {}", self.session.id, self.session.state);
            return;
        }
        if let Err(e) = self.ensure_engine().await {
            self.fail(e).await;
        }
    }

    async fn start_call(&mut self) {
        if self.session.role != Role::Initiator || self.session.state != NegotiationState::Idle {
            warn!(
                "[{}] start_call ignored: {} in state {}",
                self.session.id, self.session.role, self.session.state
            );
            return;
        }
        if let Err(e) = self.try_start_call().await {
            self.fail(e).await;
        }
    }

    async fn try_start_call(&mut self) -> Result<()> {
        let engine = self.ensure_engine().await?;
        self.set_state(NegotiationState::Offering);

        info!("[{}] Creating offer...", self.session.id);
        let offer = engine.create_offer().await.map_err(rejected)?;
        engine
            .set_local_description(offer.clone())
            .await
            .map_err(rejected)?;
        self.media_lines.learn_from_sdp(&offer.sdp);
        self.session.local_description_set = true;
        self.set_state(NegotiationState::Negotiating);

        self.send(Message::Offer(offer)).await?;
        info!("[{}] Offer sent", self.session.id);

        self.flush_local_candidates().await
    }

    async fn handle_inbound_message(&mut self, frame: &str) {
        let message = match codec::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("[{}] Dropping inbound frame: {}", self.session.id, e);
                return;
            }
        };
        debug!("[{}] Received {} message", self.session.id, message.kind());

        match message {
            Message::Offer(offer) => self.on_offer(offer).await,
            Message::Answer(answer) => self.on_answer(answer).await,
            Message::Ice(candidate) => self.on_remote_candidate(candidate).await,
            Message::EndOfCandidates => {
                debug!("[{}] Peer finished sending candidates", self.session.id)
            }
        }
    }

    async fn on_offer(&mut self, offer: SessionDescription) {
        if self.session.role != Role::Responder
            || self.session.state != NegotiationState::AwaitingOffer
        {
            self.unexpected("offer");
            return;
        }
        if let Err(e) = self.accept_offer(offer).await {
            self.fail(e).await;
        }
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<()> {
        let engine = self.ensure_engine().await?;

        info!("[{}] Setting remote description (offer)...", self.session.id);
        engine
            .set_remote_description(offer.clone())
            .await
            .map_err(rejected)?;
        self.media_lines.learn_from_sdp(&offer.sdp);
        self.session.remote_description_set = true;
        self.set_state(NegotiationState::Negotiating);
        self.flush_remote_candidates(&engine).await;

        info!("[{}] Creating answer...", self.session.id);
        let answer = engine.create_answer().await.map_err(rejected)?;
        engine
            .set_local_description(answer.clone())
            .await
            .map_err(rejected)?;
        self.media_lines.learn_from_sdp(&answer.sdp);
        self.session.local_description_set = true;

        self.send(Message::Answer(answer)).await?;
        info!("[{}] Answer sent", self.session.id);

        self.flush_local_candidates().await
    }

    async fn on_answer(&mut self, answer: SessionDescription) {
        if self.session.role != Role::Initiator
            || !self.session.local_description_set
            || self.session.remote_description_set
        {
            self.unexpected("answer");
            return;
        }
        let Some(engine) = self.engine.clone() else {
            self.unexpected("answer");
            return;
        };

        info!("[{}] Setting remote description (answer)...", self.session.id);
        if let Err(e) = engine.set_remote_description(answer.clone()).await {
            self.fail(rejected(e)).await;
            return;
        }
        self.media_lines.learn_from_sdp(&answer.sdp);
        self.session.remote_description_set = true;
        self.flush_remote_candidates(&engine).await;
    }

    async fn on_remote_candidate(&mut self, candidate: Candidate) {
        dump_candidate("REMOTE", &candidate);

        match self.engine.clone() {
            Some(engine) if self.session.can_apply_candidates() => {
                self.apply_remote(&engine, candidate).await;
            }
            _ => {
                self.remote_pending.push(candidate);
                debug!(
                    "[{}] Remote description not set yet, queued candidate ({} pending)",
                    self.session.id,
                    self.remote_pending.len()
                );
            }
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                dump_candidate("LOCAL", &candidate);
                if self.session.can_send_candidates() {
                    if let Err(e) = self.send_candidate(candidate).await {
                        self.fail(e).await;
                    }
                } else {
                    self.local_pending.push(candidate);
                    debug!(
                        "[{}] Local description not applied yet, holding candidate ({} pending)",
                        self.session.id,
                        self.local_pending.len()
                    );
                }
            }
            EngineEvent::GatheringComplete => {
                info!("[{}] ICE candidate gathering completed", self.session.id);
                analyze_candidates(&self.session.id, &self.sent);
            }
            EngineEvent::ConnectionState(state) => self.on_peer_state(state).await,
            EngineEvent::InboundTrack { mid, kind, track } => self.route_track(mid, kind, track),
        }
    }

    async fn on_peer_state(&mut self, state: PeerState) {
        info!("[{}] Peer connection state changed to: {:?}", self.session.id, state);
        match state {
            PeerState::Connected => {
                if self.session.state == NegotiationState::Negotiating {
                    self.session.connected_at = Some(chrono::Utc::now());
                    info!(
                        "[{}] Connected after {}s",
                        self.session.id,
                        self.session.age_secs()
                    );
                    self.set_state(NegotiationState::Connected);
                }
            }
            PeerState::Disconnected => {
                warn!(
                    "[{}] Peer connection disconnected, waiting for the engine to recover",
                    self.session.id
                );
            }
            PeerState::Failed => {
                error!("[{}] Peer connection failed", self.session.id);
                self.teardown(NegotiationState::Failed).await;
            }
            PeerState::Closed => self.teardown(NegotiationState::Closed).await,
            PeerState::New | PeerState::Connecting => {}
        }
    }

    fn route_track(&mut self, mid: Option<String>, reported: MediaKind, track: TrackHandle) {
        let mid = mid.unwrap_or_default();
        let kind = match self.media_lines.kind_of(&mid) {
            Some(kind) => {
                if kind != reported {
                    warn!(
                        "[{}] Track on mid {:?} reported as {} but media line is {}",
                        self.session.id, mid, reported, kind
                    );
                }
                kind
            }
            None => {
                debug!(
                    "[{}] No media line for mid {:?}, using reported kind {}",
                    self.session.id, mid, reported
                );
                reported
            }
        };
        info!("[{}] Remote {} track on mid {:?}", self.session.id, kind, mid);

        match self.on_remote_track.as_mut() {
            Some(callback) => callback(RemoteTrack {
                mid,
                kind,
                handle: track,
            }),
            None => debug!("[{}] No remote track handler registered", self.session.id),
        }
    }

    async fn flush_local_candidates(&mut self) -> Result<()> {
        let batch = self.local_pending.drain_and_clear();
        if !batch.is_empty() {
            info!(
                "[{}] Sending {} held local candidates",
                self.session.id,
                batch.len()
            );
        }
        for candidate in batch {
            self.send_candidate(candidate).await?;
        }
        Ok(())
    }

    async fn flush_remote_candidates(&mut self, engine: &Arc<dyn TransportEngine>) {
        let batch = self.remote_pending.drain_and_clear();
        if !batch.is_empty() {
            info!(
                "[{}] Applying {} pending remote candidates",
                self.session.id,
                batch.len()
            );
        }
        for candidate in batch {
            self.apply_remote(engine, candidate).await;
        }
    }

    async fn apply_remote(&mut self, engine: &Arc<dyn TransportEngine>, candidate: Candidate) {
        match engine.add_ice_candidate(candidate.clone()).await {
            Ok(()) => debug!("[{}] Applied remote candidate", self.session.id),
            Err(e) => warn!(
                "[{}] Failed to apply candidate {:?}: {}",
                self.session.id, candidate.candidate, e
            ),
        }
    }

    async fn send_candidate(&mut self, candidate: Candidate) -> Result<()> {
        self.sent.record(&candidate);
        self.send(Message::Ice(candidate)).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        let frame = codec::encode(&message)?;
        self.channel.send(frame).await.map_err(|e| match e {
            Error::ChannelClosed => Error::ChannelClosed,
            other => {
                warn!("[{}] Signaling send failed: {}", self.session.id, other);
                Error::ChannelClosed
            }
        })
    }

    async fn ensure_engine(&mut self) -> Result<Arc<dyn TransportEngine>> {
        if let Some(engine) = &self.engine {
            return Ok(engine.clone());
        }
        let events = EngineEvents::new(self.session.generation, self.events_tx.clone());
        let engine = self.factory.create(self.session.role, events).await?;
        info!(
            "[{}] Transport engine created (generation {})",
            self.session.id, self.session.generation
        );
        self.engine = Some(engine.clone());
        Ok(engine)
    }

    fn unexpected(&self, kind: &str) {
        let err = Error::UnexpectedMessageType {
            kind: kind.to_string(),
            state: self.session.state.to_string(),
        };
        warn!("[{}] Ignoring message: {}", self.session.id, err);
    }

    async fn fail(&mut self, err: Error) {
        error!("[{}] Negotiation failed: {}", self.session.id, err);
        self.teardown(NegotiationState::Failed).await;
    }

    /// Abandons the engine and everything still pending. Events raised by the
    /// old engine carry the previous generation and are dropped on arrival.
    async fn teardown(&mut self, state: NegotiationState) {
        self.session.generation += 1;

        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.close().await {
                warn!("[{}] Error closing transport engine: {}", self.session.id, e);
            }
        }

        let dropped =
            self.local_pending.drain_and_clear().len() + self.remote_pending.drain_and_clear().len();
        if dropped > 0 {
            debug!("[{}] Discarded {} pending candidates", self.session.id, dropped);
        }

        if let Some(connected_at) = self.session.connected_at {
            info!(
                "[{}] Call lasted {}s",
                self.session.id,
                chrono::Utc::now().timestamp() - connected_at.timestamp()
            );
        }
        self.set_state(state);
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.session.state == state {
            return;
        }
        info!("[{}] {} -> {}", self.session.id, self.session.state, state);
        self.session.state = state;
        self.state_tx.send_replace(state);
    }
}

fn rejected(e: Error) -> Error {
    match e {
        Error::DescriptionRejected(_) => e,
        other => Error::DescriptionRejected(other.to_string()),
    }
}
