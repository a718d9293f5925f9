//! Inbound media track consumption
//!
//! Reads RTP packets off remote tracks, keeps receive counters and
//! optionally dumps raw payloads to a file for offline inspection.
//! Decoding is out of scope; packets are accounted and discarded.

use super::session::ViewerSession;
use log::{debug, info, warn};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use webrtc::track::track_remote::TrackRemote;

/// Per-track receive accounting
#[derive(Debug, Default)]
pub struct TrackStats {
    /// Packets seen
    pub packets: u64,
    /// Payload bytes seen
    pub bytes: u64,
    /// Lost-packet estimate from forward sequence gaps
    pub lost: u64,
    last_seq: Option<u16>,
}

impl TrackStats {
    /// Record one packet. A forward jump in sequence numbers counts the
    /// skipped packets as lost; duplicates and late arrivals are ignored,
    /// so the loss figure is an estimate, not RFC 3550 accounting.
    pub fn record(&mut self, sequence: u16, payload_len: usize) {
        self.packets += 1;
        self.bytes += payload_len as u64;

        match self.last_seq {
            None => self.last_seq = Some(sequence),
            Some(last) => {
                let advance = sequence.wrapping_sub(last);
                if advance > 0 && advance < 0x8000 {
                    self.lost += (advance - 1) as u64;
                    self.last_seq = Some(sequence);
                }
            }
        }
    }
}

/// Appends raw RTP payloads to a single file
pub struct PayloadDump {
    file: File,
}

impl PayloadDump {
    /// Create (truncate) the dump file
    pub fn create(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
        })
    }

    /// Append one payload
    pub fn write(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.file.write_all(payload)
    }
}

/// Spawn the reader loop for a remote track.
///
/// The loop runs until `read_rtp` fails, which happens when the peer
/// connection closes or the track ends.
pub fn spawn_reader(
    track: Arc<TrackRemote>,
    session: Arc<ViewerSession>,
    dump_path: Option<PathBuf>,
    stats_interval_packets: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let codec = track.codec();
        let mime_type = codec.capability.mime_type.clone();
        info!("Track receiver started: {} ({})", track.kind(), mime_type);

        let mut dump = match dump_path {
            Some(path) => match PayloadDump::create(&path) {
                Ok(d) => {
                    info!("Dumping RTP payloads to {}", path.display());
                    Some(d)
                }
                Err(e) => {
                    warn!("Cannot open dump file {}: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };

        let mut stats = TrackStats::default();
        let interval = stats_interval_packets.max(1);

        loop {
            match track.read_rtp().await {
                Ok((packet, _attributes)) => {
                    if stats.packets == 0 {
                        info!(
                            "First RTP packet: pt {}, ssrc {}, seq {}, {} payload bytes",
                            packet.header.payload_type,
                            packet.header.ssrc,
                            packet.header.sequence_number,
                            packet.payload.len()
                        );
                    }

                    stats.record(packet.header.sequence_number, packet.payload.len());
                    session.stats.record_rtp(packet.payload.len());

                    if let Some(d) = dump.as_mut() {
                        if let Err(e) = d.write(&packet.payload) {
                            warn!("Dump write failed, disabling dump: {}", e);
                            dump = None;
                        }
                    }

                    if stats.packets % interval == 0 {
                        debug!(
                            "Track {}: {} packets, {} bytes, ~{} lost",
                            mime_type, stats.packets, stats.bytes, stats.lost
                        );
                        session.touch().await;
                    }
                }
                Err(e) => {
                    debug!("Track read ended: {}", e);
                    break;
                }
            }
        }

        info!(
            "Track receiver stopped: {} packets, {} bytes, ~{} lost",
            stats.packets, stats.bytes, stats.lost
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_in_order() {
        let mut stats = TrackStats::default();
        stats.record(100, 1200);
        stats.record(101, 1200);
        stats.record(102, 400);
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.bytes, 2800);
        assert_eq!(stats.lost, 0);
    }

    #[test]
    fn test_stats_gap_counts_lost() {
        let mut stats = TrackStats::default();
        stats.record(10, 100);
        stats.record(14, 100);
        assert_eq!(stats.lost, 3);
    }

    #[test]
    fn test_stats_reorder_and_duplicate_ignored() {
        let mut stats = TrackStats::default();
        stats.record(20, 100);
        stats.record(21, 100);
        stats.record(20, 100);
        stats.record(21, 100);
        assert_eq!(stats.packets, 4);
        assert_eq!(stats.lost, 0);
    }

    #[test]
    fn test_stats_sequence_wraparound() {
        let mut stats = TrackStats::default();
        stats.record(65535, 100);
        stats.record(0, 100);
        assert_eq!(stats.lost, 0);
    }
}
