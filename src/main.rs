//! peerview - Main entry point
//!
//! A headless WebRTC viewer: connects to a signaling server, answers the
//! offer it is sent and receives a video stream over the resulting session.

use clap::Parser;
use log::{debug, error, info, warn};
use std::env;
use std::path::PathBuf;
use uuid::Uuid;

use peerview::args::Args;
use peerview::config::Config;
use peerview::signaling::{SignalMessage, SignalingClient, SignalingEvent, SERVER_PEER_ID};
use peerview::webrtc::{PeerEvent, ViewerPeer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging with noise filtering for third-party WebRTC crates
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&env::var("PEERVIEW_LOG").unwrap_or_else(|_| log_level.to_string()))
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .init();

    info!("peerview v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };

    apply_env_overrides(&mut config);
    apply_cli_overrides(&mut config, &args);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }

    let uuid = Uuid::new_v4().simple().to_string();
    let client_id = format!("{}{}", config.signaling.client_id_prefix, &uuid[..8]);
    info!("Client id: {}", client_id);

    let mut client = SignalingClient::connect(&config.signaling, &client_id).await?;
    let (peer, mut peer_events) = ViewerPeer::new(config.webrtc.clone(), config.media.clone());

    let exit_on_disconnect = config.app.exit_on_disconnect;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = client.next_event() => {
                match event {
                    Some(SignalingEvent::Message(message)) => {
                        if let Err(e) = handle_signal(&peer, &client, message).await {
                            warn!("Signaling dispatch failed: {}", e);
                        }
                    }
                    Some(SignalingEvent::Closed) | None => {
                        info!("Signaling connection closed, shutting down");
                        break;
                    }
                }
            }
            event = peer_events.recv() => {
                match event {
                    Some(PeerEvent::LocalCandidate { candidate, sdp_mid, sdp_mline_index }) => {
                        let msg = SignalMessage::candidate(
                            candidate,
                            sdp_mid,
                            sdp_mline_index,
                            SERVER_PEER_ID,
                        );
                        if let Err(e) = client.send(&msg) {
                            warn!("Failed to send local candidate: {}", e);
                        }
                    }
                    Some(PeerEvent::Ended { session_id, state }) => {
                        let replaced = peer
                            .session()
                            .await
                            .map(|live| live.id != session_id)
                            .unwrap_or(false);
                        if replaced {
                            debug!("Replaced session {} ended: {:?}", session_id, state);
                        } else {
                            info!("Session {} ended: {:?}", session_id, state);
                            if exit_on_disconnect {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down...");
    let _ = client.send(&SignalMessage::bye(SERVER_PEER_ID));
    peer.close().await;
    client.close().await;

    info!("peerview stopped");
    Ok(())
}

/// Dispatch one inbound signaling message
async fn handle_signal(
    peer: &ViewerPeer,
    client: &SignalingClient,
    message: SignalMessage,
) -> Result<(), Box<dyn std::error::Error>> {
    match message {
        SignalMessage::Offer { id, sdp } => {
            info!(
                "Offer received from {}",
                id.as_deref().unwrap_or(SERVER_PEER_ID)
            );
            let answer_sdp = peer.accept_offer(&sdp).await?;
            client.send(&SignalMessage::answer(answer_sdp, SERVER_PEER_ID))?;
            info!("Answer sent");
        }
        SignalMessage::Candidate {
            candidate,
            sdp_mid,
            sdp_mline_index,
            ..
        } => {
            peer.add_remote_candidate(&candidate, sdp_mid.as_deref(), sdp_mline_index)
                .await?;
        }
        SignalMessage::Bye { id } => {
            info!(
                "Bye from {}, closing session",
                id.as_deref().unwrap_or("peer")
            );
            peer.close().await;
        }
        other => {
            debug!("Ignoring unexpected signaling message: {:?}", other);
        }
    }

    Ok(())
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(url) = env_var("PEERVIEW_URL") {
        config.signaling.url = url;
    }
    if let Some(stream) = env_var("PEERVIEW_STREAM") {
        config.media.stream_name = stream;
    }
    if let Some(trickle) = env_bool("PEERVIEW_TRICKLE") {
        config.webrtc.trickle_ice = trickle;
    }
    if let Some(list_str) = env_var("PEERVIEW_STUN_SERVERS") {
        config.webrtc.stun_servers = parse_csv_list(&list_str);
    }
    if let Some(path) = env_var("PEERVIEW_DUMP_PATH") {
        config.media.dump_path = Some(PathBuf::from(path));
    }
    if let Some(exit) = env_bool("PEERVIEW_EXIT_ON_DISCONNECT") {
        config.app.exit_on_disconnect = exit;
    }
}

fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(ref url) = args.url {
        config.signaling.url = url.clone();
    }
    if let Some(ref stream) = args.stream {
        config.media.stream_name = stream.clone();
    }
    if args.trickle {
        config.webrtc.trickle_ice = true;
    }
}

fn env_var(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = env::var(key).ok()?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_csv_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    trimmed
        .split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}
