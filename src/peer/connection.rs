use crate::config::{NegotiatorConfig, ServerConfig};
use crate::error::{Error, Result};
use crate::peer::engine::{EngineEvent, EngineEvents, EngineFactory, TransportEngine};
use crate::peer::state::PeerState;
use crate::peer::types::{Candidate, MediaKind, Role, SdpType, SessionDescription, TrackHandle};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

/// Builds `webrtc` peer connections from a [`NegotiatorConfig`].
pub struct WebRtcEngineFactory {
    config: NegotiatorConfig,
}

impl WebRtcEngineFactory {
    pub fn new(config: NegotiatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

#[async_trait]
impl EngineFactory for WebRtcEngineFactory {
    async fn create(&self, role: Role, events: EngineEvents) -> Result<Arc<dyn TransportEngine>> {
        let engine = new_peer(&self.config, role, events).await?;
        Ok(Arc::new(engine))
    }
}

/// [`TransportEngine`] backed by a `webrtc` crate peer connection
pub struct WebRtcEngine {
    pc: Arc<RTCPeerConnection>,
}

/// создаём Peer; если `initiator`, то сами добавляем трансиверы
pub async fn new_peer(
    config: &NegotiatorConfig,
    role: Role,
    events: EngineEvents,
) -> Result<WebRtcEngine> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(api.new_peer_connection(rtc_config(config)).await?);

    let candidate_events = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let events = candidate_events.clone();
        Box::pin(async move {
            match cand {
                Some(c) => match c.to_json() {
                    Ok(init) => {
                        events.emit(EngineEvent::LocalCandidate(Candidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => warn!("Failed to serialize local candidate: {}", e),
                },
                // cand == None означает конец сбора
                None => {
                    events.emit(EngineEvent::GatheringComplete);
                }
            }
        })
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        debug!("ICE gathering state changed to: {:?}", state);
        Box::pin(async {})
    }));

    let state_events = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        let state = match st {
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => PeerState::New,
            RTCPeerConnectionState::Connecting => PeerState::Connecting,
            RTCPeerConnectionState::Connected => PeerState::Connected,
            RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
            RTCPeerConnectionState::Failed => PeerState::Failed,
            RTCPeerConnectionState::Closed => PeerState::Closed,
        };
        state_events.emit(EngineEvent::ConnectionState(state));
        Box::pin(async {})
    }));

    let track_events = events;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              transceiver: Arc<RTCRtpTransceiver>| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(MediaKind::Audio),
                RTPCodecType::Video => Some(MediaKind::Video),
                _ => None,
            };
            match kind {
                Some(kind) => {
                    let mid = transceiver.mid().map(|m| m.to_string());
                    let handle: TrackHandle = track;
                    track_events.emit(EngineEvent::InboundTrack {
                        mid,
                        kind,
                        track: handle,
                    });
                }
                None => warn!("Ignoring track of unknown kind"),
            }
            Box::pin(async {})
        },
    ));

    if role == Role::Initiator {
        for kind in &config.media {
            pc.add_transceiver_from_kind(
                codec_type(*kind),
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendrecv,
                    send_encodings: vec![],
                }),
            )
            .await?;
        }
        info!("Added {} transceivers", config.media.len());
    }

    Ok(WebRtcEngine { pc })
}

#[async_trait]
impl TransportEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: Candidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::InvalidCandidate(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

fn codec_type(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Audio => RTPCodecType::Audio,
        MediaKind::Video => RTPCodecType::Video,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    rtc.map_err(|e| Error::DescriptionRejected(e.to_string()))
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        other => {
            return Err(Error::DescriptionRejected(format!(
                "unsupported description type {other}"
            )))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(config: &NegotiatorConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(&config.ice_servers),
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::media::MediaLines;
    use tokio::sync::mpsc;

    #[test]
    fn ice_servers_get_schemes_and_credentials() {
        let servers = ice_servers(&[
            ServerConfig::stun("s", "stun.example.org:3478"),
            ServerConfig::turn("t", "turn.example.org:3478", "alice", "secret"),
        ]);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.org:3478"]);
        assert!(servers[0].username.is_empty());
        assert_eq!(servers[1].urls, vec!["turn:turn.example.org:3478"]);
        assert_eq!(servers[1].username, "alice");
        assert_eq!(servers[1].credential, "secret");
    }

    #[test]
    fn rtc_config_uses_bundle_and_pool() {
        let config = rtc_config(&NegotiatorConfig::default());
        assert_eq!(config.ice_candidate_pool_size, 10);
        assert_eq!(config.bundle_policy, RTCBundlePolicy::MaxBundle);
        assert_eq!(config.ice_servers.len(), 2);
    }

    #[tokio::test]
    async fn initiator_offer_carries_configured_media_lines() {
        let config = NegotiatorConfig {
            ice_servers: vec![],
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = new_peer(&config, Role::Initiator, EngineEvents::new(0, tx))
            .await
            .unwrap();

        let offer = engine.create_offer().await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);

        let mut lines = MediaLines::new();
        lines.learn_from_sdp(&offer.sdp);
        assert_eq!(lines.len(), 2);

        engine.set_local_description(offer).await.unwrap();
        engine.close().await.unwrap();
    }
}
