//! Viewer session tracking
//!
//! One session per negotiated peer connection: state machine, activity
//! timestamps and receive counters. The run loop keys its lifetime off
//! the terminal states reported here.

use super::WebRTCError;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created, awaiting negotiation
    New,
    /// Connecting (ICE in progress)
    Connecting,
    /// Connected and receiving
    Connected,
    /// Disconnected (may recover)
    Disconnected,
    /// Failed (cannot recover)
    Failed,
    /// Closed (intentionally terminated)
    Closed,
}

impl SessionState {
    /// Terminal states that end the session for good
    pub fn is_ended(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

impl From<RTCPeerConnectionState> for SessionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New => SessionState::New,
            RTCPeerConnectionState::Connecting => SessionState::Connecting,
            RTCPeerConnectionState::Connected => SessionState::Connected,
            RTCPeerConnectionState::Disconnected => SessionState::Disconnected,
            RTCPeerConnectionState::Failed => SessionState::Failed,
            RTCPeerConnectionState::Closed => SessionState::Closed,
            _ => SessionState::New,
        }
    }
}

/// Receive-side counters, updated from callbacks
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Data channel messages received
    pub dc_messages_in: AtomicU64,
    /// Data channel messages sent
    pub dc_messages_out: AtomicU64,
    /// RTP packets received across all tracks
    pub rtp_packets: AtomicU64,
    /// RTP payload bytes received
    pub rtp_bytes: AtomicU64,
}

impl SessionStats {
    pub fn record_dc_in(&self) {
        self.dc_messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dc_out(&self) {
        self.dc_messages_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rtp(&self, payload_len: usize) {
        self.rtp_packets.fetch_add(1, Ordering::Relaxed);
        self.rtp_bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
    }
}

/// A single viewing session over one peer connection
pub struct ViewerSession {
    /// Unique session ID
    pub id: String,
    /// Peer connection
    pub peer_connection: Arc<RTCPeerConnection>,
    /// Server-opened data channel (set from on_data_channel)
    pub data_channel: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
    /// Current session state
    pub state: Arc<RwLock<SessionState>>,
    /// Session creation time
    pub created_at: Instant,
    /// Last activity time
    pub last_activity: Arc<RwLock<Instant>>,
    /// Receive counters
    pub stats: Arc<SessionStats>,
}

impl ViewerSession {
    /// Create a new session around a freshly built peer connection
    pub fn new(id: String, peer_connection: Arc<RTCPeerConnection>) -> Self {
        Self {
            id,
            peer_connection,
            data_channel: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(SessionState::New)),
            created_at: Instant::now(),
            last_activity: Arc::new(RwLock::new(Instant::now())),
            stats: Arc::new(SessionStats::default()),
        }
    }

    /// Update session state
    pub async fn set_state(&self, state: SessionState) {
        let mut current = self.state.write().await;
        if *current != state {
            debug!("Session {}: {:?} -> {:?}", self.id, *current, state);
            *current = state;
        }
    }

    /// Get current state
    pub async fn get_state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Remember the data channel handed over by the server
    pub async fn set_data_channel(&self, channel: Arc<RTCDataChannel>) {
        let mut dc = self.data_channel.write().await;
        *dc = Some(channel);
    }

    /// Forget the stored channel once the transport closes it. A handle
    /// that was already replaced by a newer channel is left alone.
    pub async fn clear_data_channel(&self, closed: &Arc<RTCDataChannel>) {
        let mut dc = self.data_channel.write().await;
        if dc.as_ref().map(|ch| Arc::ptr_eq(ch, closed)).unwrap_or(false) {
            *dc = None;
        }
    }

    /// Update last activity time
    pub async fn touch(&self) {
        let mut last = self.last_activity.write().await;
        *last = Instant::now();
    }

    /// Get session age
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Get time since last activity
    pub async fn idle_time(&self) -> std::time::Duration {
        self.last_activity.read().await.elapsed()
    }

    /// Send a text message to the server through the data channel
    pub async fn send_to_server(&self, message: &str) -> Result<(), WebRTCError> {
        let channel = self.data_channel.read().await;
        if let Some(ref ch) = *channel {
            ch.send_text(message.to_string())
                .await
                .map_err(|e| WebRTCError::DataChannelError(format!("send_text failed: {}", e)))?;
            self.stats.record_dc_out();
            Ok(())
        } else {
            Err(WebRTCError::DataChannelError(
                "Data channel not ready".to_string(),
            ))
        }
    }

    /// Close the session; safe to call more than once
    pub async fn close(&self) -> Result<(), WebRTCError> {
        if self.get_state().await == SessionState::Closed {
            return Ok(());
        }
        self.set_state(SessionState::Closed).await;

        if let Some(ref channel) = *self.data_channel.read().await {
            let _ = channel.close().await;
        }

        self.peer_connection
            .close()
            .await
            .map_err(|e| WebRTCError::ConnectionFailed(format!("close failed: {}", e)))?;

        let packets = self.stats.rtp_packets.load(Ordering::Relaxed);
        let bytes = self.stats.rtp_bytes.load(Ordering::Relaxed);
        let dc_in = self.stats.dc_messages_in.load(Ordering::Relaxed);
        let dc_out = self.stats.dc_messages_out.load(Ordering::Relaxed);
        info!(
            "Session {} closed after {:?}: {} RTP packets / {} bytes, {} dc in / {} dc out",
            self.id,
            self.age(),
            packets,
            bytes,
            dc_in,
            dc_out
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::media_engine::MediaEngine;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    async fn bare_peer_connection() -> Arc<RTCPeerConnection> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        )
    }

    #[test]
    fn test_session_state_from_rtc_state() {
        assert_eq!(SessionState::from(RTCPeerConnectionState::New), SessionState::New);
        assert_eq!(
            SessionState::from(RTCPeerConnectionState::Connected),
            SessionState::Connected
        );
        assert_eq!(
            SessionState::from(RTCPeerConnectionState::Failed),
            SessionState::Failed
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Failed.is_ended());
        assert!(SessionState::Closed.is_ended());
        assert!(!SessionState::Disconnected.is_ended());
        assert!(!SessionState::Connected.is_ended());
    }

    #[test]
    fn test_stats_counters() {
        let stats = SessionStats::default();
        stats.record_rtp(1200);
        stats.record_rtp(800);
        stats.record_dc_in();
        assert_eq!(stats.rtp_packets.load(Ordering::Relaxed), 2);
        assert_eq!(stats.rtp_bytes.load(Ordering::Relaxed), 2000);
        assert_eq!(stats.dc_messages_in.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_close_clears_stored_channel() {
        let pc = bare_peer_connection().await;
        let session = ViewerSession::new("s-dc".to_string(), pc.clone());

        let first = pc.create_data_channel("control", None).await.unwrap();
        session.set_data_channel(first.clone()).await;

        // A close for a channel that was already replaced is ignored.
        let second = pc.create_data_channel("control2", None).await.unwrap();
        session.set_data_channel(second.clone()).await;
        session.clear_data_channel(&first).await;
        assert!(session.data_channel.read().await.is_some());

        session.clear_data_channel(&second).await;
        assert!(session.data_channel.read().await.is_none());

        let err = session.send_to_server("hello").await.unwrap_err();
        assert!(matches!(err, WebRTCError::DataChannelError(_)));

        pc.close().await.unwrap();
    }
}
