//! WebRTC PeerConnection management
//!
//! Builds the answering side of the session: API construction, offer
//! handling, ICE candidate exchange and callback wiring. One peer
//! connection is live at a time; a fresh offer replaces it.

use super::data_channel::ViewerDataChannel;
use super::media_track;
use super::session::{SessionState, ViewerSession};
use super::WebRTCError;
use crate::config::{MediaConfig, WebRTCConfig};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

/// Events the run loop consumes from the peer side
#[derive(Debug)]
pub enum PeerEvent {
    /// Local ICE candidate to trickle to the server
    LocalCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    },
    /// A session reached a terminal state. Carries the session id so a
    /// consumer can drop events from a session that was already replaced.
    Ended {
        session_id: String,
        state: SessionState,
    },
}

/// Answering peer: owns the live session and its negotiation
pub struct ViewerPeer {
    config: WebRTCConfig,
    media: MediaConfig,
    current: RwLock<Option<Arc<ViewerSession>>>,
    /// Remote candidates that arrived before the remote description
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
}

impl ViewerPeer {
    /// Create the peer alongside the event channel the run loop reads
    pub fn new(
        config: WebRTCConfig,
        media: MediaConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                media,
                current: RwLock::new(None),
                pending_candidates: Mutex::new(Vec::new()),
                events_tx,
            },
            events_rx,
        )
    }

    /// Accept a remote offer and produce the answer SDP.
    ///
    /// In non-trickle mode the answer is returned only after candidate
    /// gathering completes, so the SDP carries the full candidate set.
    pub async fn accept_offer(&self, sdp: &str) -> Result<String, WebRTCError> {
        if let Some(old) = self.current.write().await.take() {
            info!("Replacing live session {}", old.id);
            let _ = old.close().await;
            self.pending_candidates.lock().await.clear();
        }

        let session = self.create_session().await?;
        let pc = session.peer_connection.clone();
        *self.current.write().await = Some(session.clone());

        let offer = RTCSessionDescription::offer(sdp.to_string())
            .map_err(|e| WebRTCError::SdpError(format!("Invalid SDP offer: {}", e)))?;

        pc.set_remote_description(offer)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("Failed to set remote description: {}", e)))?;
        session.set_state(SessionState::Connecting).await;

        self.flush_pending_candidates(&pc).await;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| WebRTCError::SdpError(format!("Failed to create answer: {}", e)))?;

        let mut gather_complete = pc.gathering_complete_promise().await;

        pc.set_local_description(answer.clone())
            .await
            .map_err(|e| WebRTCError::SdpError(format!("Failed to set local description: {}", e)))?;

        if !self.config.trickle_ice {
            let _ = gather_complete.recv().await;
            if let Some(local_desc) = pc.local_description().await {
                return Ok(local_desc.sdp);
            }
        }

        if let Some(local_desc) = pc.local_description().await {
            return Ok(local_desc.sdp);
        }

        Ok(answer.sdp)
    }

    /// Apply a remote ICE candidate, caching it if the offer has not
    /// arrived yet
    pub async fn add_remote_candidate(
        &self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u16>,
    ) -> Result<(), WebRTCError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.to_string(),
            sdp_mid: sdp_mid.map(|s| s.to_string()),
            sdp_mline_index,
            username_fragment: None,
        };

        let current = self.current.read().await;
        match current.as_ref() {
            Some(session) if session.peer_connection.remote_description().await.is_some() => {
                session
                    .peer_connection
                    .add_ice_candidate(init)
                    .await
                    .map_err(|e| WebRTCError::IceError(format!("Failed to add ICE candidate: {}", e)))?;
                session.touch().await;
            }
            _ => {
                debug!("Caching remote candidate until the offer is applied");
                self.pending_candidates.lock().await.push(init);
            }
        }

        Ok(())
    }

    /// The live session, if any
    pub async fn session(&self) -> Option<Arc<ViewerSession>> {
        self.current.read().await.clone()
    }

    /// Close the live session
    pub async fn close(&self) {
        if let Some(session) = self.current.write().await.take() {
            if let Err(e) = session.close().await {
                warn!("Session close failed: {}", e);
            }
        }
        self.pending_candidates.lock().await.clear();
    }

    /// Build API, peer connection and session, and wire all callbacks
    async fn create_session(&self) -> Result<Arc<ViewerSession>, WebRTCError> {
        let api = self.build_api()?;

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers(),
            ..Default::default()
        };

        let peer_connection = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| WebRTCError::ConnectionFailed(format!("Failed to create peer connection: {}", e)))?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(ViewerSession::new(session_id, Arc::new(peer_connection)));

        self.setup_callbacks(&session);

        // Receive-only media section so the answer advertises video intake
        let transceiver_init = RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Recvonly,
            send_encodings: Vec::new(),
        };
        session
            .peer_connection
            .add_transceiver_from_kind(RTPCodecType::Video, Some(transceiver_init))
            .await
            .map_err(|e| WebRTCError::MediaError(format!("Failed to add video transceiver: {}", e)))?;

        info!("Created session {}", session.id);
        Ok(session)
    }

    /// Construct the webrtc API object with the configured codec
    fn build_api(&self) -> Result<API, WebRTCError> {
        let mut media_engine = MediaEngine::default();
        self.register_video_codec(&mut media_engine)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| WebRTCError::ConnectionFailed(format!("Failed to register interceptors: {}", e)))?;

        let setting_engine = SettingEngine::default();

        Ok(APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build())
    }

    /// Register the configured video codec in the media engine
    fn register_video_codec(&self, media_engine: &mut MediaEngine) -> Result<(), WebRTCError> {
        let codec = self.config.video_codec;

        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: RTCRtpCodecCapability {
                        mime_type: codec.mime_type().to_string(),
                        clock_rate: 90000,
                        channels: 0,
                        sdp_fmtp_line: codec.fmtp_line().to_string(),
                        rtcp_feedback: vec![],
                    },
                    payload_type: codec.rtp_payload_type(),
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .map_err(|e| {
                WebRTCError::ConnectionFailed(format!("Failed to register {}: {}", codec.as_str(), e))
            })?;

        Ok(())
    }

    /// ICE server list from configuration
    fn ice_servers(&self) -> Vec<RTCIceServer> {
        if self.config.stun_servers.is_empty() {
            return Vec::new();
        }
        vec![RTCIceServer {
            urls: self.config.stun_servers.clone(),
            ..Default::default()
        }]
    }

    /// Wire connection/ICE/gathering/signaling state, candidate, data
    /// channel and track callbacks
    fn setup_callbacks(&self, session: &Arc<ViewerSession>) {
        let pc = &session.peer_connection;

        let state_session = session.clone();
        let state_events = self.events_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let session = state_session.clone();
            let events = state_events.clone();
            Box::pin(async move {
                info!("Session {} connection state: {:?}", session.id, state);
                let mapped = SessionState::from(state);
                session.set_state(mapped).await;
                if state == RTCPeerConnectionState::Connected {
                    session.touch().await;
                }
                if mapped.is_ended() {
                    let _ = events.send(PeerEvent::Ended {
                        session_id: session.id.clone(),
                        state: mapped,
                    });
                }
            })
        }));

        let ice_session = session.clone();
        pc.on_ice_connection_state_change(Box::new(move |state| {
            let session_id = ice_session.id.clone();
            Box::pin(async move {
                debug!("Session {} ICE connection state: {:?}", session_id, state);
            })
        }));

        let gather_session = session.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state| {
            let session_id = gather_session.id.clone();
            Box::pin(async move {
                debug!("Session {} ICE gathering state: {:?}", session_id, state);
            })
        }));

        let signaling_session = session.clone();
        pc.on_signaling_state_change(Box::new(move |state| {
            let session_id = signaling_session.id.clone();
            Box::pin(async move {
                debug!("Session {} signaling state: {:?}", session_id, state);
            })
        }));

        let trickle = self.config.trickle_ice;
        let cand_events = self.events_tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let events = cand_events.clone();
            Box::pin(async move {
                let Some(c) = candidate else {
                    debug!("Local candidate gathering finished");
                    return;
                };
                if !trickle {
                    // Candidates end up embedded in the answer SDP instead
                    return;
                }
                match c.to_json() {
                    Ok(init) => {
                        let _ = events.send(PeerEvent::LocalCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        });
                    }
                    Err(e) => warn!("Candidate serialization failed: {}", e),
                }
            })
        }));

        let dc_session = session.clone();
        let stream_name = self.media.stream_name.clone();
        pc.on_data_channel(Box::new(move |channel| {
            let session = dc_session.clone();
            let stream_name = stream_name.clone();
            Box::pin(async move {
                info!("Data channel received: '{}'", channel.label());
                ViewerDataChannel::attach(channel, session, stream_name).await;
            })
        }));

        let track_session = session.clone();
        let dump_path = self.media.dump_path.clone();
        let stats_interval = self.media.stats_interval_packets;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let session = track_session.clone();
            let dump_path = dump_path.clone();
            Box::pin(async move {
                media_track::spawn_reader(track, session, dump_path, stats_interval);
            })
        }));
    }

    /// Apply candidates that arrived before the remote description.
    /// Stale candidates are logged and skipped rather than failing the
    /// negotiation.
    async fn flush_pending_candidates(&self, pc: &Arc<RTCPeerConnection>) {
        let mut pending = self.pending_candidates.lock().await;
        if pending.is_empty() {
            return;
        }
        info!("Applying {} cached remote candidates", pending.len());
        for init in pending.drain(..) {
            if let Err(e) = pc.add_ice_candidate(init).await {
                warn!("Cached candidate rejected: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MediaConfig, WebRTCConfig};

    async fn local_offer_sdp() -> String {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).unwrap();
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        let _dc = pc.create_data_channel("stream", None).await.unwrap();
        let _ = pc
            .add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .unwrap();

        let offer = pc.create_offer(None).await.unwrap();
        pc.set_local_description(offer).await.unwrap();
        pc.local_description().await.unwrap().sdp
    }

    fn test_config() -> WebRTCConfig {
        WebRTCConfig {
            stun_servers: Vec::new(),
            trickle_ice: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_accept_offer_produces_answer() {
        let (peer, _events_rx) = ViewerPeer::new(test_config(), MediaConfig::default());

        let offer_sdp = local_offer_sdp().await;
        let answer_sdp = peer.accept_offer(&offer_sdp).await.unwrap();

        assert!(answer_sdp.starts_with("v=0"));
        assert!(peer.session().await.is_some());

        peer.close().await;
        assert!(peer.session().await.is_none());
    }

    #[tokio::test]
    async fn test_candidate_cached_before_offer() {
        let (peer, _events_rx) = ViewerPeer::new(test_config(), MediaConfig::default());

        peer.add_remote_candidate(
            "candidate:1 1 UDP 2122252543 192.0.2.1 49152 typ host",
            Some("0"),
            Some(0),
        )
        .await
        .unwrap();

        assert_eq!(peer.pending_candidates.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_offer_replaces_live_session() {
        let (peer, mut events_rx) = ViewerPeer::new(test_config(), MediaConfig::default());

        let first = local_offer_sdp().await;
        peer.accept_offer(&first).await.unwrap();
        let first_id = peer.session().await.unwrap().id.clone();

        let second = local_offer_sdp().await;
        peer.accept_offer(&second).await.unwrap();
        let second_id = peer.session().await.unwrap().id.clone();

        assert_ne!(first_id, second_id);

        // Closing the replaced session raises a terminal state; it must
        // name that session, never the live one.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        while let Ok(event) = events_rx.try_recv() {
            if let PeerEvent::Ended { session_id, .. } = event {
                assert_eq!(session_id, first_id);
            }
        }

        peer.close().await;
    }
}
