//! Signaling layer
//!
//! WebSocket connection to the signaling server plus the JSON wire
//! protocol spoken over it.

pub mod client;
pub mod protocol;

pub use client::{SignalingClient, SignalingEvent};
pub use protocol::{SignalMessage, SignalParser, SERVER_PEER_ID};

use std::error::Error;
use std::fmt;

/// Signaling-related errors
#[derive(Debug)]
pub enum SignalingError {
    /// WebSocket connection could not be established
    ConnectFailed(String),
    /// Wire protocol violation
    Protocol(String),
    /// The connection is no longer open
    Closed,
}

impl fmt::Display for SignalingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingError::ConnectFailed(msg) => write!(f, "Connect failed: {}", msg),
            SignalingError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            SignalingError::Closed => write!(f, "Connection closed"),
        }
    }
}

impl Error for SignalingError {}
