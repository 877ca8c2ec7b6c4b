//! File-backed `PacketSource`: replays a previously recorded capture in
//! file order, using the file's own timestamps (spec.md §2.1: "Two
//! implementations: replay from a capture file (timestamps from the
//! file)...").

use std::fs::File;
use std::path::Path;

use pcap_file::pcap::PcapReader;
use tracing::debug;

use crate::ethernet::parse_udp_frame;
use crate::{PacketSource, RawPacket, TsUsec};

#[derive(Debug, thiserror::Error)]
pub enum ReplaySourceError {
    #[error("opening capture file '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("reading capture header: {0}")]
    Header(#[from] pcap_file::PcapError),
}

/// Reads a classic-format pcap file and yields its UDP frames in file
/// order. Non-UDP frames (anything `meter_capture::ethernet` can't decode)
/// are silently skipped, per spec.md §6.
pub struct ReplaySource {
    reader: PcapReader<File>,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self, ReplaySourceError> {
        let file = File::open(path).map_err(|source| ReplaySourceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let reader = PcapReader::new(file)?;
        Ok(ReplaySource { reader })
    }
}

impl PacketSource for ReplaySource {
    /// Advances to the next decodable UDP frame, skipping anything else the
    /// capture contains (non-IPv4, non-UDP, or truncated frames) until one
    /// is found or the file is exhausted.
    fn next_packet(&mut self) -> Option<RawPacket> {
        loop {
            let pcap_packet = match self.reader.next_packet()? {
                Ok(pkt) => pkt,
                Err(e) => {
                    debug!(error = %e, "malformed capture record, skipping rest of file");
                    return None;
                }
            };
            let ts_usec = i64::try_from(pcap_packet.timestamp.as_micros()).unwrap_or(i64::MAX);
            if let Some(udp) = parse_udp_frame(&pcap_packet.data) {
                return Some(RawPacket {
                    ts_usec,
                    src: udp.src,
                    dst: udp.dst,
                    payload: udp.payload.to_vec(),
                });
            }
            // Not a UDP frame: drop it and keep scanning (spec.md §6).
        }
    }
}
