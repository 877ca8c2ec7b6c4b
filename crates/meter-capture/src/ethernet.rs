//! Minimal Ethernet/IPv4/UDP frame parser. The core "requires only a
//! function returning `(ts_usec, payload_bytes)`" (spec.md §6); this module
//! is what gets it there from a raw link-layer capture frame, and is also
//! where "drops any non-UDP input at the Packet Source boundary" (§6) is
//! enforced.

use std::net::Ipv4Addr;

use meter_proto::Endpoint;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const IP_PROTO_UDP: u8 = 17;

/// A decoded UDP datagram lifted out of its link-layer framing.
pub struct UdpFrame<'a> {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub payload: &'a [u8],
}

/// Parses one captured Ethernet frame down to its UDP payload, or `None` if
/// it isn't an Ethernet/IPv4/UDP frame (any other shape is silently
/// dropped, per spec.md §6).
pub fn parse_udp_frame(frame: &[u8]) -> Option<UdpFrame<'_>> {
    let mut offset = 12; // dst mac (6) + src mac (6)
    let mut ethertype = u16::from_be_bytes(frame.get(offset..offset + 2)?.try_into().ok()?);
    offset += 2;
    if ethertype == ETHERTYPE_VLAN {
        // Skip the 4-byte 802.1Q tag and re-read the real ethertype.
        ethertype = u16::from_be_bytes(frame.get(offset + 2..offset + 4)?.try_into().ok()?);
        offset += 4;
    }
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = frame.get(offset..)?;
    let version_ihl = *ip.first()?;
    if version_ihl >> 4 != 4 {
        return None; // not IPv4
    }
    let ihl_bytes = usize::from(version_ihl & 0x0F) * 4;
    if ihl_bytes < 20 {
        return None;
    }
    let protocol = *ip.get(9)?;
    if protocol != IP_PROTO_UDP {
        return None;
    }
    let src_ip = Ipv4Addr::new(*ip.get(12)?, *ip.get(13)?, *ip.get(14)?, *ip.get(15)?);
    let dst_ip = Ipv4Addr::new(*ip.get(16)?, *ip.get(17)?, *ip.get(18)?, *ip.get(19)?);

    let udp = ip.get(ihl_bytes..)?;
    if udp.len() < 8 {
        return None;
    }
    let src_port = u16::from_be_bytes(udp[0..2].try_into().ok()?);
    let dst_port = u16::from_be_bytes(udp[2..4].try_into().ok()?);
    let udp_len = usize::from(u16::from_be_bytes(udp[4..6].try_into().ok()?));
    if udp_len < 8 {
        return None;
    }
    let payload = udp.get(8..udp_len)?;

    Some(UdpFrame {
        src: Endpoint::new(src_ip, src_port),
        dst: Endpoint::new(dst_ip, dst_port),
        payload,
    })
}
