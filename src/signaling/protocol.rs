//! Signaling Wire Protocol
//!
//! JSON messages exchanged with the signaling server over WebSocket,
//! discriminated by a `type` field and addressed by an `id` field.

use super::SignalingError;
use serde::{Deserialize, Serialize};

/// Well-known peer id of the signaling server.
pub const SERVER_PEER_ID: &str = "server";

/// Signaling message types for session negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    /// Session request, sent right after the socket opens
    Request {
        id: String,
    },

    /// SDP offer from the server
    Offer {
        #[serde(default)]
        id: Option<String>,
        sdp: String,
    },

    /// SDP answer back to the server
    Answer {
        id: String,
        sdp: String,
    },

    /// Trickled ICE candidate, either direction
    Candidate {
        #[serde(default)]
        id: Option<String>,
        candidate: String,
        #[serde(rename = "sdpMid")]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex")]
        sdp_mline_index: Option<u16>,
    },

    /// Session teardown notice
    Bye {
        #[serde(default)]
        id: Option<String>,
    },
}

impl SignalMessage {
    /// Parse a signaling message from JSON
    pub fn from_json(json: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(json)
            .map_err(|e| SignalingError::Protocol(format!("invalid signaling message: {}", e)))
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self)
            .map_err(|e| SignalingError::Protocol(format!("failed to serialize message: {}", e)))
    }

    /// Create the initial session request
    pub fn request(id: &str) -> Self {
        SignalMessage::Request { id: id.to_string() }
    }

    /// Create an answer message
    pub fn answer(sdp: String, id: &str) -> Self {
        SignalMessage::Answer {
            id: id.to_string(),
            sdp,
        }
    }

    /// Create an ICE candidate message
    pub fn candidate(
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
        id: &str,
    ) -> Self {
        SignalMessage::Candidate {
            id: Some(id.to_string()),
            candidate,
            sdp_mid,
            sdp_mline_index,
        }
    }

    /// Create a teardown notice
    pub fn bye(id: &str) -> Self {
        SignalMessage::Bye {
            id: Some(id.to_string()),
        }
    }

    /// Get the peer id the message is addressed to/from, if present
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            SignalMessage::Request { id } => Some(id),
            SignalMessage::Offer { id, .. } => id.as_deref(),
            SignalMessage::Answer { id, .. } => Some(id),
            SignalMessage::Candidate { id, .. } => id.as_deref(),
            SignalMessage::Bye { id } => id.as_deref(),
        }
    }
}

/// Parser for inbound WebSocket text frames
pub struct SignalParser;

impl SignalParser {
    /// Parse a WebSocket text frame into a signaling message.
    ///
    /// Frames that are not JSON objects are rejected up front so a chatty
    /// server cannot feed arbitrary text into serde.
    pub fn parse(text: &str) -> Result<SignalMessage, SignalingError> {
        let text = text.trim();

        if text.starts_with('{') {
            return SignalMessage::from_json(text);
        }

        let preview: String = text.chars().take(50).collect();
        Err(SignalingError::Protocol(format!(
            "unknown message format: {}",
            preview
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offer() {
        let json = r#"{"id": "server", "type": "offer", "sdp": "v=0\r\n..."}"#;
        let msg = SignalParser::parse(json).unwrap();
        match msg {
            SignalMessage::Offer { id, sdp } => {
                assert_eq!(id.as_deref(), Some("server"));
                assert!(sdp.starts_with("v=0"));
            }
            _ => panic!("Expected Offer"),
        }
    }

    #[test]
    fn test_parse_offer_without_id() {
        let json = r#"{"type": "offer", "sdp": "v=0\r\n..."}"#;
        let msg = SignalParser::parse(json).unwrap();
        assert!(matches!(msg, SignalMessage::Offer { id: None, .. }));
    }

    #[test]
    fn test_candidate_wire_names() {
        let json = r#"{"type": "candidate", "id": "server",
                       "candidate": "candidate:1 1 UDP 2122252543 192.0.2.1 49152 typ host",
                       "sdpMid": "0", "sdpMLineIndex": 0}"#;
        let msg = SignalParser::parse(json).unwrap();
        match msg {
            SignalMessage::Candidate {
                sdp_mid,
                sdp_mline_index,
                ..
            } => {
                assert_eq!(sdp_mid.as_deref(), Some("0"));
                assert_eq!(sdp_mline_index, Some(0));
            }
            _ => panic!("Expected Candidate"),
        }
    }

    #[test]
    fn test_answer_serialization() {
        let msg = SignalMessage::answer("v=0...".to_string(), SERVER_PEER_ID);
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"answer""#));
        assert!(json.contains(r#""id":"server""#));
    }

    #[test]
    fn test_candidate_serialization_uses_wire_names() {
        let msg = SignalMessage::candidate(
            "candidate:0 1 UDP 1 198.51.100.7 3478 typ host".to_string(),
            Some("0".to_string()),
            Some(0),
            SERVER_PEER_ID,
        );
        let json = msg.to_json().unwrap();
        assert!(json.contains("sdpMid"));
        assert!(json.contains("sdpMLineIndex"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = SignalParser::parse(r#"{"type": "renegotiate"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_non_json_rejected() {
        let err = SignalParser::parse("HELO peerview");
        assert!(err.is_err());
    }
}
