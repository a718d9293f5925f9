//! WebRTC viewer implementation
//!
//! This module provides the receiving side of a WebRTC stream:
//! - Peer connection construction and answer negotiation
//! - Session state tracking
//! - DataChannel request/keepalive handling
//! - Inbound media track consumption

pub mod data_channel;
pub mod media_track;
pub mod peer_connection;
pub mod session;

pub use peer_connection::{PeerEvent, ViewerPeer};
pub use session::{SessionState, ViewerSession};

use std::error::Error;
use std::fmt;

/// Errors from the viewer peer
#[derive(Debug)]
pub enum WebRTCError {
    /// Peer connection could not be created or closed
    ConnectionFailed(String),
    /// Offer/answer negotiation failed
    SdpError(String),
    /// Remote ICE candidate could not be applied
    IceError(String),
    /// Data channel send or wiring failed
    DataChannelError(String),
    /// Video transceiver setup failed
    MediaError(String),
}

impl fmt::Display for WebRTCError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebRTCError::ConnectionFailed(msg) => write!(f, "Peer connection error: {}", msg),
            WebRTCError::SdpError(msg) => write!(f, "SDP negotiation error: {}", msg),
            WebRTCError::IceError(msg) => write!(f, "ICE candidate error: {}", msg),
            WebRTCError::DataChannelError(msg) => write!(f, "Data channel error: {}", msg),
            WebRTCError::MediaError(msg) => write!(f, "Media track error: {}", msg),
        }
    }
}

impl Error for WebRTCError {}
