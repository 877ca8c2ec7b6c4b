//! Live capture `PacketSource`, gated behind the `live-capture` Cargo
//! feature — it links `libpcap` and needs elevated capture permissions a
//! plain `cargo test` environment won't have, the same reason the teacher
//! gates OS-specific hardware access behind `rt-eink`'s `hardware` feature.
//!
//! Timestamps come from the wall clock (spec.md §2: "live capture
//! (timestamps from wall clock)"), not from the device's own packet
//! timestamp, so a clock change mid-capture can't desynchronize the
//! pipeline's notion of "now" from the reassembler's GC sweep.

use std::time::{SystemTime, UNIX_EPOCH};

use pcap::{Active, Capture, Device};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ethernet::parse_udp_frame;
use crate::{PacketSource, RawPacket};

#[derive(Debug, Error)]
pub enum LiveSourceError {
    #[error("opening capture device '{device}': {source}")]
    Open {
        device: String,
        #[source]
        source: pcap::Error,
    },
    #[error("compiling BPF filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },
}

/// Wraps a live `pcap` capture handle. Stamps every packet with the wall
/// clock at the moment it's pulled off the handle, per spec.md §2.
pub struct LiveSource {
    capture: Capture<Active>,
}

impl LiveSource {
    /// Opens `device` (or the OS default if `None`) and installs `filter`
    /// (pass `RECOMMENDED_LIVE_FILTER` unless the caller has a reason not
    /// to).
    pub fn open(device: Option<&str>, filter: &str) -> Result<Self, LiveSourceError> {
        let device = match device {
            Some(name) => Device::list()
                .ok()
                .and_then(|devices| devices.into_iter().find(|d| d.name == name))
                .unwrap_or_else(|| Device {
                    name: name.to_owned(),
                    desc: None,
                    addresses: Vec::new(),
                    flags: pcap::DeviceFlags::empty(),
                }),
            None => Device::lookup()
                .ok()
                .flatten()
                .ok_or_else(|| LiveSourceError::Open {
                    device: "<default>".to_owned(),
                    source: pcap::Error::PcapError("no default device".to_owned()),
                })?,
        };
        let device_name = device.name.clone();
        let mut capture = Capture::from_device(device)
            .map_err(|source| LiveSourceError::Open {
                device: device_name.clone(),
                source,
            })?
            .promisc(true)
            .snaplen(65535)
            .timeout(1000) // ms; bounds the blocking pop per spec.md §5
            .open()
            .map_err(|source| LiveSourceError::Open {
                device: device_name,
                source,
            })?;
        capture
            .filter(filter, true)
            .map_err(|source| LiveSourceError::Filter {
                filter: filter.to_owned(),
                source,
            })?;
        Ok(LiveSource { capture })
    }

    fn now_usec() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

impl PacketSource for LiveSource {
    /// Blocks (up to the capture handle's timeout) for the next frame,
    /// decodes it, and loops past anything that isn't UDP/IPv4. Returns
    /// `None` only when the underlying handle reports it's no longer
    /// capturing (device closed).
    fn next_packet(&mut self) -> Option<RawPacket> {
        loop {
            match self.capture.next_packet() {
                Ok(packet) => {
                    let ts = Self::now_usec();
                    if let Some(udp) = parse_udp_frame(packet.data) {
                        return Some(RawPacket {
                            ts_usec: ts,
                            src: udp.src,
                            dst: udp.dst,
                            payload: udp.payload.to_vec(),
                        });
                    }
                    // Not UDP/IPv4: drop and keep polling, per spec.md §6.
                }
                Err(pcap::Error::TimeoutExpired) => {
                    debug!("capture poll timed out, retrying");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "live capture handle closed");
                    return None;
                }
            }
        }
    }
}
