//! WebRTC DataChannel request/keepalive handling
//!
//! The server opens the channel; the viewer answers on it. On open the
//! configured stream name is requested, afterwards the server's "Ping"
//! keepalives are answered with "Pong". Everything else the server says
//! on the channel is treated as a notice and logged.

use super::session::ViewerSession;
use log::{debug, info, warn};
use std::sync::Arc;
use webrtc::data_channel::RTCDataChannel;

/// Keepalive message sent by the server
pub const KEEPALIVE_PING: &str = "Ping";
/// Keepalive reply the server expects
pub const KEEPALIVE_PONG: &str = "Pong";

/// Classification of inbound channel text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerText {
    /// Keepalive ping
    Ping,
    /// Anything else the server sends
    Notice(String),
}

/// Classify an inbound text message. Matching is exact; the keepalive
/// protocol is case-sensitive.
pub fn classify_text(text: &str) -> ServerText {
    if text == KEEPALIVE_PING {
        ServerText::Ping
    } else {
        ServerText::Notice(text.to_string())
    }
}

/// Reply owed for an inbound text message, if any
pub fn keepalive_reply(text: &str) -> Option<&'static str> {
    match classify_text(text) {
        ServerText::Ping => Some(KEEPALIVE_PONG),
        ServerText::Notice(_) => None,
    }
}

/// Handler wiring for the server-opened data channel
pub struct ViewerDataChannel;

impl ViewerDataChannel {
    /// Attach open/message/close/error handlers to a channel the server
    /// just opened. `stream_name` is requested as soon as the channel is up.
    pub async fn attach(
        channel: Arc<RTCDataChannel>,
        session: Arc<ViewerSession>,
        stream_name: String,
    ) {
        session.set_data_channel(channel.clone()).await;
        let label = channel.label().to_string();

        let open_channel = channel.clone();
        let open_session = session.clone();
        let open_label = label.clone();
        channel.on_open(Box::new(move || {
            Box::pin(async move {
                info!(
                    "Data channel '{}' open, requesting stream '{}'",
                    open_label, stream_name
                );
                match open_channel.send_text(stream_name).await {
                    Ok(_) => open_session.stats.record_dc_out(),
                    Err(e) => warn!("Stream request failed: {}", e),
                }
            })
        }));

        let msg_channel = channel.clone();
        let msg_session = session.clone();
        let msg_label = label.clone();
        channel.on_message(Box::new(move |msg| {
            let channel = msg_channel.clone();
            let session = msg_session.clone();
            let label = msg_label.clone();

            Box::pin(async move {
                session.stats.record_dc_in();
                session.touch().await;

                if !msg.is_string {
                    debug!("Data channel '{}' binary message: {} bytes", label, msg.data.len());
                    return;
                }

                let text = String::from_utf8_lossy(&msg.data);
                match classify_text(&text) {
                    ServerText::Ping => {
                        debug!("Data channel '{}' keepalive", label);
                        match channel.send_text(KEEPALIVE_PONG.to_string()).await {
                            Ok(_) => session.stats.record_dc_out(),
                            Err(e) => warn!("Keepalive reply failed: {}", e),
                        }
                    }
                    ServerText::Notice(notice) => {
                        info!("Data channel '{}' notice: {}", label, notice);
                    }
                }
            })
        }));

        let close_channel = channel.clone();
        let close_session = session.clone();
        let close_label = label.clone();
        channel.on_close(Box::new(move || {
            let channel = close_channel.clone();
            let session = close_session.clone();
            let label = close_label.clone();
            Box::pin(async move {
                info!("Data channel '{}' closed", label);
                session.clear_data_channel(&channel).await;
            })
        }));

        channel.on_error(Box::new(move |err| {
            let label = label.clone();
            Box::pin(async move {
                warn!("Data channel '{}' error: {}", label, err);
            })
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_classified() {
        assert_eq!(classify_text("Ping"), ServerText::Ping);
    }

    #[test]
    fn test_ping_is_case_sensitive() {
        assert_eq!(classify_text("ping"), ServerText::Notice("ping".to_string()));
        assert_eq!(classify_text("PING"), ServerText::Notice("PING".to_string()));
    }

    #[test]
    fn test_keepalive_reply() {
        assert_eq!(keepalive_reply("Ping"), Some("Pong"));
        assert_eq!(keepalive_reply("Pong"), None);
        assert_eq!(keepalive_reply("stream ready"), None);
    }

    #[test]
    fn test_notice_keeps_payload() {
        match classify_text("playing my_video.webm") {
            ServerText::Notice(text) => assert_eq!(text, "playing my_video.webm"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
