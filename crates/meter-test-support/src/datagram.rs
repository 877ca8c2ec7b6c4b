//! Byte-level builders for the reliable-UDP wire format (spec.md §4.1), used
//! by `meter-transport`'s own tests and by the crate-root integration tests.
//! These write the same layout `meter-transport::Reassembler` parses; kept
//! here rather than behind `#[cfg(test)]` in that crate so integration tests
//! can reuse them too.

/// Wraps pre-built command bytes in a datagram header.
pub fn datagram(commands: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1u16.to_be_bytes()); // peer_id
    out.push(0); // crc_enabled
    out.push(commands.len() as u8);
    for cmd in commands {
        out.extend_from_slice(cmd);
    }
    out
}

/// Builds a complete `Unreliable`/`Reliable` command (header + body).
pub fn reliable_command(reliable: bool, channel: u8, seq: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(if reliable { 7 } else { 6 });
    out.push(channel);
    out.push(0); // flags
    out.push(0); // reserved
    out.extend_from_slice(&(body.len() as i32).to_be_bytes());
    out.extend_from_slice(&i32::from(seq).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Builds a complete `ReliableFragment` command (header + fragment header +
/// fragment bytes).
pub fn fragment_command(
    sequence: i32,
    fragment_count: i32,
    fragment_number: i32,
    fragment_offset: i32,
    total_length: i32,
    bytes: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(8); // ReliableFragment
    out.push(0); // channel_id
    out.push(0); // flags
    out.push(0); // reserved
    out.extend_from_slice(&(20 + bytes.len() as i32).to_be_bytes()); // command_length
    out.extend_from_slice(&sequence.to_be_bytes()); // reliable_seq doubles as sequence here
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&fragment_count.to_be_bytes());
    out.extend_from_slice(&fragment_number.to_be_bytes());
    out.extend_from_slice(&total_length.to_be_bytes());
    out.extend_from_slice(&fragment_offset.to_be_bytes());
    out.extend_from_slice(bytes);
    out
}
