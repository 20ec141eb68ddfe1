//! Packet parsing: Ethernet/VLAN → IPv4 or IPv6 (walking extension headers)
//! → TCP/UDP, using `pnet`'s zero-copy packet views.
//!
//! Parsing never produces an error type — a malformed packet is simply
//! dropped. [`parse_packet`] returns `None` and the caller is expected to
//! log at `debug` and move on (§7's fail-silent policy).

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

const IPV6_HEADER_LEN: usize = 40;
/// Size of a Fragment extension header — `rte_ipv6_frag_hdr` in the
/// original, 8 bytes, not derivable from its own `size` field.
const IPV6_FRAG_HDR_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkHeader {
    V4,
    V6 {
        src_hi: u64,
        src_lo: u64,
        dst_hi: u64,
        dst_lo: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHeader {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
    Other(u8),
}

/// The subset of a parsed packet the classifier cascade needs.
///
/// `network_offset`/`transport_offset` are byte offsets from the start of
/// the frame to the start of each header — the `offset_u16` half of the
/// `{type_be16, offset_u16}` / `{proto_u16, offset_u16}` parse-output
/// contract; `network`'s and `transport`'s own variants carry the
/// type/protocol half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeaders {
    pub vlan: Option<u16>,
    pub network: NetworkHeader,
    pub network_offset: u16,
    pub transport: TransportHeader,
    pub transport_offset: u16,
}

/// Parses `data` as an Ethernet frame, rejecting truncated headers, bad
/// IPv4 IHLs, a `total_length`/`payload_length` that doesn't fit the
/// buffer, or an IPv6 extension chain that runs off the end of the
/// payload.
pub fn parse_packet(data: &[u8]) -> Option<ParsedHeaders> {
    let eth = EthernetPacket::new(data)?;
    let mut ethertype = eth.get_ethertype();
    let mut offset = EthernetPacket::minimum_packet_size();
    let mut vlan = None;

    if ethertype == EtherTypes::Vlan {
        if data.len() < offset + 4 {
            return None;
        }
        let tci = u16::from_be_bytes([data[offset], data[offset + 1]]);
        vlan = Some(tci);
        ethertype =
            pnet::packet::ethernet::EtherType::new(u16::from_be_bytes([
                data[offset + 2],
                data[offset + 3],
            ]));
        offset += 4;
    }

    let network_offset = offset;
    match ethertype {
        EtherTypes::Ipv4 => parse_ipv4(&data[offset..]),
        EtherTypes::Ipv6 => parse_ipv6(&data[offset..]),
        _ => None,
    }
    .map(|(network, transport, transport_local_offset)| ParsedHeaders {
        vlan,
        network,
        network_offset: network_offset as u16,
        transport,
        transport_offset: (offset + transport_local_offset) as u16,
    })
}

fn parse_ipv4(data: &[u8]) -> Option<(NetworkHeader, TransportHeader, usize)> {
    let ipv4 = Ipv4Packet::new(data)?;
    if ipv4.get_version() != 4 || ipv4.get_header_length() < 5 {
        return None;
    }
    let header_len = ipv4.get_header_length() as usize * 4;
    let total_len = ipv4.get_total_length() as usize;
    if total_len < header_len || data.len() < total_len {
        return None;
    }

    let transport = parse_transport(ipv4.get_next_level_protocol(), &data[header_len..])?;
    Some((NetworkHeader::V4, transport, header_len))
}

fn parse_ipv6(data: &[u8]) -> Option<(NetworkHeader, TransportHeader, usize)> {
    let ipv6 = Ipv6Packet::new(data)?;
    let payload_len = ipv6.get_payload_length() as usize;
    if data.len() < IPV6_HEADER_LEN + payload_len {
        return None;
    }

    let src = ipv6.get_source().octets();
    let dst = ipv6.get_destination().octets();
    let network = NetworkHeader::V6 {
        src_hi: u64::from_be_bytes(src[0..8].try_into().unwrap()),
        src_lo: u64::from_be_bytes(src[8..16].try_into().unwrap()),
        dst_hi: u64::from_be_bytes(dst[0..8].try_into().unwrap()),
        dst_lo: u64::from_be_bytes(dst[8..16].try_into().unwrap()),
    };

    let max_offset = IPV6_HEADER_LEN + payload_len;
    let mut ext_type = ipv6.get_next_header();
    let mut offset = IPV6_HEADER_LEN;

    while offset < max_offset {
        match ext_type {
            IpNextHeaderProtocols::Hopopt
            | IpNextHeaderProtocols::Ipv6Route
            | IpNextHeaderProtocols::Ipv6Opts => {
                if max_offset < offset + 8 || data.len() < offset + 2 {
                    return None;
                }
                let next = data[offset];
                let size = data[offset + 1] as usize;
                ext_type = IpNextHeaderProtocol::new(next);
                offset += (1 + size) * 8;
            }
            IpNextHeaderProtocols::Ah => {
                if max_offset < offset + 8 || data.len() < offset + 2 {
                    return None;
                }
                let next = data[offset];
                let size = data[offset + 1] as usize;
                ext_type = IpNextHeaderProtocol::new(next);
                offset += (2 + size) * 4;
            }
            IpNextHeaderProtocols::Ipv6Frag => {
                if max_offset < offset + 8 || data.len() < offset + 1 {
                    return None;
                }
                let next = data[offset];
                ext_type = IpNextHeaderProtocol::new(next);
                offset += IPV6_FRAG_HDR_LEN;
            }
            _ => break,
        }
    }

    if offset > max_offset {
        return None;
    }

    let transport = parse_transport(ext_type, &data[offset..])?;
    Some((network, transport, offset))
}

fn parse_transport(proto: IpNextHeaderProtocol, data: &[u8]) -> Option<TransportHeader> {
    match proto {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(data)?;
            Some(TransportHeader::Tcp {
                src_port: tcp.get_source(),
                dst_port: tcp.get_destination(),
            })
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(data)?;
            Some(TransportHeader::Udp {
                src_port: udp.get_source(),
                dst_port: udp.get_destination(),
            })
        }
        other => Some(TransportHeader::Other(other.0)),
    }
}
