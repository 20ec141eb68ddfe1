//! Builds raw Ethernet frames for the integration tests to feed straight
//! into `filterplane::packet::parse_packet`.

use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::tcp::MutableTcpPacket;
use pnet::packet::udp::MutableUdpPacket;
use pnet::util::MacAddr;
use std::net::Ipv6Addr;

const IPV6_HEADER_LEN: usize = 40;

/// A TCP segment over IPv6, wrapped in an Ethernet frame, with no
/// extension headers.
pub fn tcp_v6(src: Ipv6Addr, dst: Ipv6Addr, src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut tcp_buf = vec![0u8; 20];
    {
        let mut tcp = MutableTcpPacket::new(&mut tcp_buf).unwrap();
        tcp.set_source(src_port);
        tcp.set_destination(dst_port);
        tcp.set_data_offset(5);
    }
    ipv6_frame(src, dst, IpNextHeaderProtocols::Tcp, &tcp_buf)
}

/// A UDP datagram over IPv6, wrapped in an Ethernet frame.
pub fn udp_v6(src: Ipv6Addr, dst: Ipv6Addr, src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut udp_buf = vec![0u8; 8];
    {
        let mut udp = MutableUdpPacket::new(&mut udp_buf).unwrap();
        udp.set_source(src_port);
        udp.set_destination(dst_port);
        udp.set_length(8);
    }
    ipv6_frame(src, dst, IpNextHeaderProtocols::Udp, &udp_buf)
}

/// A TCP segment over IPv6 preceded by a Hop-by-Hop extension header of
/// `hbh_8byte_units` 8-byte units beyond the mandatory first one.
pub fn tcp_v6_with_hop_by_hop(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    src_port: u16,
    dst_port: u16,
    hbh_8byte_units: u8,
) -> Vec<u8> {
    let mut tcp_buf = vec![0u8; 20];
    {
        let mut tcp = MutableTcpPacket::new(&mut tcp_buf).unwrap();
        tcp.set_source(src_port);
        tcp.set_destination(dst_port);
        tcp.set_data_offset(5);
    }

    let hbh_len = (1 + hbh_8byte_units as usize) * 8;
    let mut hbh_buf = vec![0u8; hbh_len];
    hbh_buf[0] = IpNextHeaderProtocols::Tcp.0;
    hbh_buf[1] = hbh_8byte_units;

    let mut payload = hbh_buf;
    payload.extend_from_slice(&tcp_buf);
    ipv6_frame(src, dst, IpNextHeaderProtocols::Hopopt, &payload)
}

fn ipv6_frame(src: Ipv6Addr, dst: Ipv6Addr, next_header: pnet::packet::ip::IpNextHeaderProtocol, payload: &[u8]) -> Vec<u8> {
    let mut ipv6_buf = vec![0u8; IPV6_HEADER_LEN + payload.len()];
    {
        let mut ipv6 = MutableIpv6Packet::new(&mut ipv6_buf).unwrap();
        ipv6.set_version(6);
        ipv6.set_source(src);
        ipv6.set_destination(dst);
        ipv6.set_next_header(next_header);
        ipv6.set_payload_length(payload.len() as u16);
        ipv6.set_payload(payload);
    }

    let mut eth_buf = vec![0u8; EthernetPacket::minimum_packet_size() + ipv6_buf.len()];
    {
        let mut eth = MutableEthernetPacket::new(&mut eth_buf).unwrap();
        eth.set_source(MacAddr::new(1, 2, 3, 4, 5, 6));
        eth.set_destination(MacAddr::new(6, 5, 4, 3, 2, 1));
        eth.set_ethertype(EtherTypes::Ipv6);
        eth.set_payload(&ipv6_buf);
    }
    eth_buf
}

/// Splits an IPv6 address into its high and low 64-bit halves, the same
/// split `filterplane::rule::Prefix` and the classifier cascade use.
pub fn halves(addr: Ipv6Addr) -> (u64, u64) {
    let octets = addr.octets();
    let hi = u64::from_be_bytes(octets[0..8].try_into().unwrap());
    let lo = u64::from_be_bytes(octets[8..16].try_into().unwrap());
    (hi, lo)
}
