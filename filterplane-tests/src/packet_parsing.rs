//! S6: packets carrying an IPv6 extension header chain still resolve to
//! their transport header once the chain is walked, exercised end to end
//! through `filterplane::packet::parse_packet` and `CompiledFilter`.

use filterplane::packet::{parse_packet, TransportHeader};
use filterplane::{AclCompiler, PortRange, Rule};
use std::net::Ipv6Addr;

#[test]
fn s6_a_hop_by_hop_extension_header_is_walked_to_reach_tcp() {
    let src = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let dst = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    let frame = crate::packet::tcp_v6_with_hop_by_hop(src, dst, 9000, 22, 0);

    let parsed = parse_packet(&frame).expect("frame with one hop-by-hop header parses");
    assert_eq!(
        parsed.transport,
        TransportHeader::Tcp {
            src_port: 9000,
            dst_port: 22
        }
    );
    // ethernet (14) + ipv6 (40) + a single mandatory 8-byte hop-by-hop unit.
    assert_eq!(parsed.transport_offset as usize, 14 + 40 + 8);
}

#[test]
fn s6_a_longer_hop_by_hop_header_is_skipped_by_its_declared_length() {
    let src = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let dst = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    // 2 extra 8-byte units beyond the mandatory first one: 24 bytes total.
    let frame = crate::packet::tcp_v6_with_hop_by_hop(src, dst, 9000, 22, 2);

    let parsed = parse_packet(&frame).expect("frame parses using the header's own size field");
    assert_eq!(
        parsed.transport,
        TransportHeader::Tcp {
            src_port: 9000,
            dst_port: 22
        }
    );
    // ethernet (14) + ipv6 (40) + hop-by-hop (1 mandatory + 2 extra 8-byte units = 24).
    assert_eq!(parsed.transport_offset as usize, 14 + 40 + 24);
}

#[test]
fn s6_a_truncated_extension_chain_is_dropped_not_misparsed() {
    let src = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let dst = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    let mut frame = crate::packet::tcp_v6_with_hop_by_hop(src, dst, 9000, 22, 4);
    // Claim a 5*8=40-byte hop-by-hop header but cut the frame off well
    // before the chain (or the TCP header behind it) actually ends.
    frame.truncate(frame.len() - 30);

    assert_eq!(parse_packet(&frame), None);
}

// A dropped (unparsable) packet still resolves through `CompiledFilter`'s
// fail-silent path to the configured default action rather than surfacing
// an error to the caller.
#[test]
fn an_unparsable_extension_chain_falls_back_to_the_default_action_via_process() {
    let mut rule = Rule::new(1);
    rule.dst_ports = vec![PortRange::new(22, 22)];
    let filter = AclCompiler::compile(&[rule], 3).unwrap();

    let src = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let dst = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    let mut frame = crate::packet::tcp_v6_with_hop_by_hop(src, dst, 9000, 22, 4);
    frame.truncate(frame.len() - 30);

    assert_eq!(filter.process(&frame), 3);
}
