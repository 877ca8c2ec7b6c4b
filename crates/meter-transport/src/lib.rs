//! Reliable-UDP command parsing and per-flow fragment reassembly (spec.md
//! §4.1). Turns raw datagram bytes into ordered, complete command bodies
//! ready for the classifier; nothing here looks inside a command body.

mod cursor;
mod reassembly;

use std::collections::HashMap;

use meter_proto::FlowKey;
use thiserror::Error;
use tracing::{debug, warn};

use cursor::Cursor;
use reassembly::ReassemblyBuffer;

/// Monotonic timestamp in microseconds, as handed down by the packet source.
/// The reassembler never reads the wall clock itself so it stays
/// deterministic under test.
pub type TsUsec = i64;

const GC_TTL_USEC: TsUsec = 30_000_000;
const DEFAULT_ARENA_CAP_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("datagram too short for its header")]
    TruncatedDatagramHeader,
    #[error("command header truncated or its declared length overruns the datagram")]
    TruncatedCommandHeader,
}

/// A complete, ordered command body ready for the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledMessage {
    pub flow: FlowKey,
    pub channel: u8,
    pub reliable: bool,
    pub seq: u16,
    pub body: Vec<u8>,
}

/// Non-fatal conditions raised while reassembling one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportWarning {
    UnknownCommandType(u8),
    /// A command header was truncated or its declared length overran the
    /// datagram; everything after it in this datagram had to be abandoned.
    MalformedCommand,
    ReassemblyFailed { flow: FlowKey, sequence: i32 },
    ReassemblyOverflowEvicted { flow: FlowKey, sequence: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(ReassembledMessage),
    Warning(TransportWarning),
}

struct DatagramHeader {
    #[allow(dead_code)]
    peer_id: u16,
    #[allow(dead_code)]
    crc_enabled: bool,
    command_count: u8,
}

impl DatagramHeader {
    fn parse(cursor: &mut Cursor<'_>) -> Result<Self, TransportError> {
        let peer_id = cursor.read_u16().ok_or(TransportError::TruncatedDatagramHeader)?;
        let crc_enabled = cursor
            .read_bool()
            .ok_or(TransportError::TruncatedDatagramHeader)?;
        let command_count = cursor
            .read_u8()
            .ok_or(TransportError::TruncatedDatagramHeader)?;
        Ok(DatagramHeader {
            peer_id,
            crc_enabled,
            command_count,
        })
    }
}

struct CommandHeader {
    command_type: u8,
    channel_id: u8,
    #[allow(dead_code)]
    flags: u8,
    #[allow(dead_code)]
    reserved: u8,
    command_length: i32,
    reliable_seq: i32,
}

impl CommandHeader {
    fn parse(cursor: &mut Cursor<'_>) -> Result<Self, TransportError> {
        let err = || TransportError::TruncatedCommandHeader;
        let command_type = cursor.read_u8().ok_or_else(err)?;
        let channel_id = cursor.read_u8().ok_or_else(err)?;
        let flags = cursor.read_u8().ok_or_else(err)?;
        let reserved = cursor.read_u8().ok_or_else(err)?;
        let command_length = cursor.read_i32().ok_or_else(err)?;
        let reliable_seq = cursor.read_i32().ok_or_else(err)?;
        Ok(CommandHeader {
            command_type,
            channel_id,
            flags,
            reserved,
            command_length,
            reliable_seq,
        })
    }
}

struct FragmentHeader {
    sequence: i32,
    fragment_count: i32,
    fragment_number: i32,
    total_length: i32,
    fragment_offset: i32,
}

impl FragmentHeader {
    fn parse(cursor: &mut Cursor<'_>) -> Option<Self> {
        Some(FragmentHeader {
            sequence: cursor.read_i32()?,
            fragment_count: cursor.read_i32()?,
            fragment_number: cursor.read_i32()?,
            total_length: cursor.read_i32()?,
            fragment_offset: cursor.read_i32()?,
        })
    }
}

/// Per-flow fragment reassembly state plus the command parser front end.
///
/// Grounded on the Quake2 `NetChan`/`FragmentState` split (one reassembly
/// slot keyed by sequence, tracked independently of the unreliable path) and
/// on `hdds`'s `transport::lowbw` layering of a thin command parser over a
/// stateful reassembler.
pub struct Reassembler {
    buffers: HashMap<(FlowKey, i32), ReassemblyBuffer>,
    total_bytes: usize,
    arena_cap_bytes: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Reassembler::new(DEFAULT_ARENA_CAP_BYTES)
    }
}

impl Reassembler {
    pub fn new(arena_cap_bytes: usize) -> Self {
        Reassembler {
            buffers: HashMap::new(),
            total_bytes: 0,
            arena_cap_bytes,
        }
    }

    /// Parse one datagram and advance reassembly state. `ts` is the
    /// datagram's capture timestamp, used both to stamp new reassembly
    /// buffers and to drive the 30-second GC sweep.
    pub fn ingest_datagram(
        &mut self,
        flow: FlowKey,
        ts: TsUsec,
        datagram: &[u8],
    ) -> Vec<TransportEvent> {
        self.gc(ts);

        let mut events = Vec::new();
        let mut cursor = Cursor::new(datagram);
        let header = match DatagramHeader::parse(&mut cursor) {
            Ok(header) => header,
            Err(e) => {
                warn!(%flow, error = %e, "dropping datagram");
                return events;
            }
        };

        for _ in 0..header.command_count {
            let cmd = match CommandHeader::parse(&mut cursor) {
                Ok(cmd) => cmd,
                Err(e) => {
                    debug!(%flow, error = %e, "abandoning rest of datagram");
                    events.push(TransportEvent::Warning(TransportWarning::MalformedCommand));
                    break;
                }
            };
            let Some(body) = cursor.read_bytes(usize_or_break(cmd.command_length)) else {
                debug!(%flow, "command_length overruns datagram, abandoning rest of datagram");
                events.push(TransportEvent::Warning(TransportWarning::MalformedCommand));
                break;
            };

            match cmd.command_type {
                6 => events.push(TransportEvent::Message(ReassembledMessage {
                    flow,
                    channel: cmd.channel_id,
                    reliable: false,
                    seq: cmd.reliable_seq as u16,
                    body: body.to_vec(),
                })),
                7 => events.push(TransportEvent::Message(ReassembledMessage {
                    flow,
                    channel: cmd.channel_id,
                    reliable: true,
                    seq: cmd.reliable_seq as u16,
                    body: body.to_vec(),
                })),
                8 => events.extend(self.ingest_fragment(flow, cmd.channel_id, ts, body)),
                other => events.push(TransportEvent::Warning(
                    TransportWarning::UnknownCommandType(other),
                )),
            }
        }

        events
    }

    fn ingest_fragment(
        &mut self,
        flow: FlowKey,
        channel: u8,
        ts: TsUsec,
        body: &[u8],
    ) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let mut cursor = Cursor::new(body);
        let Some(frag) = FragmentHeader::parse(&mut cursor) else {
            return events;
        };
        let fragment_bytes = cursor.remaining();

        if frag.fragment_number < 0
            || frag.fragment_count <= 0
            || frag.fragment_number >= frag.fragment_count
        {
            return events;
        }
        let (Some(offset), Some(total_length)) = (
            usize_or_none(frag.fragment_offset),
            usize_or_none(frag.total_length),
        ) else {
            return events;
        };
        match offset.checked_add(fragment_bytes.len()) {
            Some(end) if end <= total_length => {}
            _ => return events,
        }

        let key = (flow, frag.sequence);

        if let Some(existing) = self.buffers.get(&key) {
            if existing.total_length() != total_length {
                self.remove_buffer(&key);
                events.push(TransportEvent::Warning(TransportWarning::ReassemblyFailed {
                    flow,
                    sequence: frag.sequence,
                }));
                return events;
            }
        } else {
            events.extend(self.make_room_for(total_length));
            self.total_bytes += total_length;
            self.buffers.insert(
                key,
                ReassemblyBuffer::new(total_length, frag.fragment_count as usize, ts),
            );
        }

        let buffer = self.buffers.get_mut(&key).expect("just inserted or present");
        buffer.place(frag.fragment_number as usize, offset, fragment_bytes, ts);

        if buffer.is_complete() {
            if let Some(data) = self.remove_buffer(&key) {
                events.push(TransportEvent::Message(ReassembledMessage {
                    flow,
                    channel,
                    reliable: true,
                    seq: frag.sequence as u16,
                    body: data.into_data(),
                }));
            }
        }
        events
    }

    fn remove_buffer(&mut self, key: &(FlowKey, i32)) -> Option<ReassemblyBuffer> {
        let buffer = self.buffers.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(buffer.total_length());
        Some(buffer)
    }

    /// Evicts the oldest-touched incomplete buffer(s) until there is room
    /// for `incoming_bytes` more, per the 16 MiB arena cap.
    fn make_room_for(&mut self, incoming_bytes: usize) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while self.total_bytes + incoming_bytes > self.arena_cap_bytes && !self.buffers.is_empty()
        {
            let Some((&key, _)) = self
                .buffers
                .iter()
                .min_by_key(|(_, buf)| buf.last_touched())
            else {
                break;
            };
            self.remove_buffer(&key);
            warn!(flow = %key.0, sequence = key.1, "reassembly arena cap hit, evicting oldest buffer");
            events.push(TransportEvent::Warning(
                TransportWarning::ReassemblyOverflowEvicted {
                    flow: key.0,
                    sequence: key.1,
                },
            ));
        }
        events
    }

    /// Drops buffers that haven't seen a fragment in 30 seconds.
    fn gc(&mut self, now: TsUsec) {
        let expired: Vec<(FlowKey, i32)> = self
            .buffers
            .iter()
            .filter(|(_, buf)| now - buf.last_touched() > GC_TTL_USEC)
            .map(|(&key, _)| key)
            .collect();
        for key in expired {
            self.remove_buffer(&key);
        }
    }
}

fn usize_or_break(n: i32) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn usize_or_none(n: i32) -> Option<usize> {
    usize::try_from(n).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_test_support::datagram::{datagram, fragment_command, reliable_command};
    use meter_test_support::endpoint;

    fn flow() -> FlowKey {
        FlowKey::new(endpoint(1), endpoint(2))
    }

    #[test]
    fn unreliable_and_reliable_commands_pass_through_immediately() {
        let mut r = Reassembler::default();
        let dg = datagram(&[reliable_command(false, 3, 10, b"hello")]);
        let events = r.ingest_datagram(flow(), 0, &dg);
        assert_eq!(
            events,
            vec![TransportEvent::Message(ReassembledMessage {
                flow: flow(),
                channel: 3,
                reliable: false,
                seq: 10,
                body: b"hello".to_vec(),
            })]
        );
    }

    #[test]
    fn fragments_reassemble_once_all_have_arrived() {
        let mut r = Reassembler::default();
        let whole = b"the quick brown fox jumps".to_vec();
        let a = &whole[..10];
        let b = &whole[10..];

        let dg1 = datagram(&[fragment_command(1, 2, 0, 0, whole.len() as i32, a)]);
        let events = r.ingest_datagram(flow(), 0, &dg1);
        assert!(events.is_empty(), "incomplete reassembly must not emit yet");

        let dg2 = datagram(&[fragment_command(1, 2, 1, 10, whole.len() as i32, b)]);
        let events = r.ingest_datagram(flow(), 1, &dg2);
        assert_eq!(
            events,
            vec![TransportEvent::Message(ReassembledMessage {
                flow: flow(),
                channel: 0,
                reliable: true,
                seq: 1,
                body: whole,
            })]
        );
    }

    #[test]
    fn out_of_order_fragments_still_reassemble() {
        let mut r = Reassembler::default();
        let whole = b"0123456789".to_vec();

        let dg_second = datagram(&[fragment_command(5, 2, 1, 5, 10, &whole[5..])]);
        assert!(r.ingest_datagram(flow(), 0, &dg_second).is_empty());

        let dg_first = datagram(&[fragment_command(5, 2, 0, 0, 10, &whole[..5])]);
        let events = r.ingest_datagram(flow(), 1, &dg_first);
        assert_eq!(
            events,
            vec![TransportEvent::Message(ReassembledMessage {
                flow: flow(),
                channel: 0,
                reliable: true,
                seq: 5,
                body: whole,
            })]
        );
    }

    #[test]
    fn mismatched_total_length_drops_buffer_and_warns() {
        let mut r = Reassembler::default();
        let dg1 = datagram(&[fragment_command(9, 3, 0, 0, 30, b"abc")]);
        assert!(r.ingest_datagram(flow(), 0, &dg1).is_empty());

        let dg2 = datagram(&[fragment_command(9, 3, 1, 3, 999, b"def")]);
        let events = r.ingest_datagram(flow(), 1, &dg2);
        assert_eq!(
            events,
            vec![TransportEvent::Warning(TransportWarning::ReassemblyFailed {
                flow: flow(),
                sequence: 9,
            })]
        );
    }

    #[test]
    fn fragment_number_at_or_past_count_is_ignored() {
        let mut r = Reassembler::default();
        let dg = datagram(&[fragment_command(2, 1, 1, 0, 10, b"xyz")]);
        assert!(r.ingest_datagram(flow(), 0, &dg).is_empty());
        assert!(r.buffers.is_empty());
    }

    #[test]
    fn unknown_command_type_is_warned_and_skipped_without_aborting_datagram() {
        let mut r = Reassembler::default();
        let mut bogus = reliable_command(false, 0, 2, b"second");
        bogus[0] = 200; // not Unreliable/Reliable/ReliableFragment
        let dg = datagram(&[reliable_command(false, 0, 1, b"first"), bogus]);
        let events = r.ingest_datagram(flow(), 0, &dg);
        assert_eq!(
            events,
            vec![
                TransportEvent::Message(ReassembledMessage {
                    flow: flow(),
                    channel: 0,
                    reliable: false,
                    seq: 1,
                    body: b"first".to_vec(),
                }),
                TransportEvent::Warning(TransportWarning::UnknownCommandType(200)),
            ]
        );
    }

    #[test]
    fn gc_evicts_buffers_older_than_thirty_seconds() {
        let mut r = Reassembler::default();
        let dg = datagram(&[fragment_command(1, 2, 0, 0, 20, b"0123456789")]);
        r.ingest_datagram(flow(), 0, &dg);
        assert_eq!(r.buffers.len(), 1);

        let later = datagram(&[fragment_command(77, 2, 0, 0, 4, b"ab")]);
        r.ingest_datagram(flow(), 31_000_000, &later);
        assert!(!r.buffers.contains_key(&(flow(), 1)), "stale buffer should be gc'd");
    }

    #[test]
    fn arena_cap_evicts_oldest_incomplete_buffer() {
        let mut r = Reassembler::new(16);
        let dg1 = datagram(&[fragment_command(1, 2, 0, 0, 10, b"0123456789")]);
        r.ingest_datagram(flow(), 0, &dg1);
        assert_eq!(r.buffers.len(), 1);

        let dg2 = datagram(&[fragment_command(2, 2, 0, 0, 10, b"9876543210")]);
        r.ingest_datagram(flow(), 1, &dg2);
        assert!(
            !r.buffers.contains_key(&(flow(), 1)),
            "oldest buffer should have been evicted to make room"
        );
        assert!(r.buffers.contains_key(&(flow(), 2)));
    }
}
