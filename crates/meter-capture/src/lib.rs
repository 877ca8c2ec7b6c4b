//! `PacketSource` (spec.md §6): the core "requires only a function
//! returning `(ts_usec, payload_bytes)`" from whatever supplies raw UDP
//! traffic. Two concrete implementations live here — `replay::ReplaySource`
//! (pcap file, always available) and `live::LiveSource` (live capture,
//! gated behind the `live-capture` feature since it needs libpcap and
//! capture permissions a plain `cargo test` environment won't have).
//!
//! Grounded on the teacher's split between `crates/emulator` (a synthetic
//! data generator/replay source) and `services/*/src/main.rs` (the live I/O
//! entry point), generalized using `other_examples`' `liveshark-core`
//! `PacketSource`/`PcapFileSource` trait split — a pure trait boundary with
//! file-backed and live-backed implementations on either side of it.

pub mod ethernet;
pub mod replay;

#[cfg(feature = "live-capture")]
pub mod live;

use meter_proto::Endpoint;

/// Monotonic capture timestamp in microseconds. Replay sources use the
/// capture file's own timestamps; live sources use the wall clock.
pub type TsUsec = i64;

/// Recommended (not required, spec.md §6) BPF filter for live capture.
/// Exposed ungated so config loading can use it as a default even when the
/// `live-capture` feature isn't compiled in.
pub const RECOMMENDED_LIVE_FILTER: &str = "udp and (port 5055 or port 5056 or port 5058)";

pub fn live_filter_default() -> String {
    RECOMMENDED_LIVE_FILTER.to_owned()
}

/// One raw UDP datagram lifted out of its capture framing, with its
/// already-decoded endpoints (spec.md §2: "yields `(monotonic_ts,
/// udp_payload_bytes, src_endpoint, dst_endpoint)`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub ts_usec: TsUsec,
    pub src: Endpoint,
    pub dst: Endpoint,
    pub payload: Vec<u8>,
}

/// A source of raw UDP packets the engine can drain. `next_packet` returns
/// `None` once the source is exhausted (end of file, or the capture handle
/// was closed); it never blocks indefinitely without a way to observe
/// shutdown — the live implementation polls with a timeout for exactly this
/// reason (spec.md §5: "Suspension points: only at (a) the capture-queue
/// blocking pop with timeout...").
pub trait PacketSource {
    fn next_packet(&mut self) -> Option<RawPacket>;
}
