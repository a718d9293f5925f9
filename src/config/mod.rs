//! Configuration management for peerview

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Video codec the viewer advertises in its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    VP8,
    VP9,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::VP8 => "vp8",
            VideoCodec::VP9 => "vp9",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "video/H264",
            VideoCodec::VP8 => "video/VP8",
            VideoCodec::VP9 => "video/VP9",
        }
    }

    pub fn rtp_payload_type(&self) -> u8 {
        match self {
            VideoCodec::H264 => 96,
            VideoCodec::VP8 => 97,
            VideoCodec::VP9 => 98,
        }
    }

    pub fn fmtp_line(&self) -> &'static str {
        match self {
            VideoCodec::H264 => {
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
            }
            VideoCodec::VP8 => "",
            VideoCodec::VP9 => "profile-id=0",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Signaling connection configuration
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// WebRTC configuration
    #[serde(default)]
    pub webrtc: WebRTCConfig,

    /// Media handling configuration
    #[serde(default)]
    pub media: MediaConfig,

    /// Application behavior
    #[serde(default)]
    pub app: AppConfig,
}

/// Signaling connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Signaling server base URL (ws:// or wss://)
    #[serde(default = "default_signaling_url")]
    pub url: String,

    /// Prefix for the generated client id
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    /// Connection attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Delay between connection attempts in milliseconds
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: default_signaling_url(),
            client_id_prefix: default_client_id_prefix(),
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
        }
    }
}

/// WebRTC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRTCConfig {
    /// ICE server URLs (stun:/turn:)
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    /// Trickle ICE: send the answer immediately and stream candidates
    /// instead of embedding them in the SDP
    #[serde(default)]
    pub trickle_ice: bool,

    /// Video codec selection
    #[serde(default)]
    pub video_codec: VideoCodec,
}

impl Default for WebRTCConfig {
    fn default() -> Self {
        Self {
            stun_servers: default_stun_servers(),
            trickle_ice: false,
            video_codec: VideoCodec::H264,
        }
    }
}

/// Media handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Stream name requested over the data channel
    #[serde(default = "default_stream_name")]
    pub stream_name: String,

    /// Optional file the raw RTP payloads are appended to
    #[serde(default)]
    pub dump_path: Option<PathBuf>,

    /// Emit a per-track stats line every N packets
    #[serde(default = "default_stats_interval_packets")]
    pub stats_interval_packets: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            stream_name: default_stream_name(),
            dump_path: None,
            stats_interval_packets: default_stats_interval_packets(),
        }
    }
}

/// Application behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exit once the session ends instead of waiting for a new offer
    #[serde(default = "default_exit_on_disconnect")]
    pub exit_on_disconnect: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exit_on_disconnect: default_exit_on_disconnect(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file; a missing file falls back to
    /// defaults with a warning
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.signaling.url.is_empty() {
            return Err("Signaling URL must not be empty".into());
        }

        if !self.signaling.url.starts_with("ws://") && !self.signaling.url.starts_with("wss://") {
            return Err("Signaling URL must use the ws:// or wss:// scheme".into());
        }

        if self.signaling.connect_attempts == 0 {
            return Err("Signaling connect_attempts must be at least 1".into());
        }

        for server in &self.webrtc.stun_servers {
            let value = server.trim();
            if value.is_empty() {
                return Err("ICE server URL must not be empty".into());
            }
            if !value.starts_with("stun:")
                && !value.starts_with("turn:")
                && !value.starts_with("turns:")
            {
                return Err("ICE server URLs must use the stun:, turn: or turns: scheme".into());
            }
        }

        if self.media.stream_name.is_empty() {
            return Err("Media stream_name must not be empty".into());
        }

        if self.media.stats_interval_packets == 0 {
            return Err("Media stats_interval_packets must be non-zero".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let path = PathBuf::from("/nonexistent/peerview-test.toml");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.signaling.url, default_signaling_url());
        assert_eq!(cfg.media.stream_name, default_stream_name());
    }

    #[test]
    fn validate_rejects_bad_scheme() {
        let mut cfg = Config::default();
        cfg.signaling.url = "http://127.0.0.1:8000".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut cfg = Config::default();
        cfg.signaling.connect_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_ice_scheme() {
        let mut cfg = Config::default();
        cfg.webrtc.stun_servers = vec!["udp:stun.example.org".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [signaling]
            url = "wss://signal.example.org:9443"

            [webrtc]
            trickle_ice = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.signaling.url, "wss://signal.example.org:9443");
        assert_eq!(cfg.signaling.client_id_prefix, "viewer_");
        assert!(cfg.webrtc.trickle_ice);
        assert_eq!(cfg.webrtc.video_codec, VideoCodec::H264);
        assert_eq!(cfg.media.stream_name, "my_video.webm");
        assert!(cfg.app.exit_on_disconnect);
    }

    #[test]
    fn codec_wire_parameters() {
        assert_eq!(VideoCodec::H264.mime_type(), "video/H264");
        assert_eq!(VideoCodec::H264.rtp_payload_type(), 96);
        assert_eq!(VideoCodec::VP8.rtp_payload_type(), 97);
        assert_eq!(VideoCodec::VP9.fmtp_line(), "profile-id=0");
    }
}

fn default_signaling_url() -> String {
    "ws://127.0.0.1:8000".to_string()
}

fn default_client_id_prefix() -> String {
    "viewer_".to_string()
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_retry_delay_ms() -> u64 {
    2000
}

fn default_stun_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

fn default_stream_name() -> String {
    "my_video.webm".to_string()
}

fn default_stats_interval_packets() -> u64 {
    500
}

fn default_exit_on_disconnect() -> bool {
    true
}
