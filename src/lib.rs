//! peerview - headless WebRTC viewer
//!
//! Connects to a signaling server over a WebSocket, answers the SDP offer it
//! receives, and consumes the resulting video stream. Session control runs
//! over a server-created data channel.

pub mod args;
pub mod config;
pub mod signaling;
pub mod webrtc;

// Re-exports
pub use config::{Config, VideoCodec};
pub use signaling::{SignalMessage, SignalingClient, SignalingEvent};
pub use crate::webrtc::{SessionState, ViewerPeer, ViewerSession};
