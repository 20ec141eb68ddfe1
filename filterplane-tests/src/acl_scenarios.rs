//! Black-box scenarios against `filterplane::AclCompiler`'s public API: one
//! rule set compiled, a handful of packets classified, the action checked.

use crate::packet::halves;
use filterplane::packet::{parse_packet, ParsedHeaders};
use filterplane::{AclCompiler, PortRange, Prefix, Rule};
use std::net::Ipv6Addr;

fn v6_tcp(src: Ipv6Addr, dst: Ipv6Addr, src_port: u16, dst_port: u16) -> ParsedHeaders {
    parse_packet(&crate::packet::tcp_v6(src, dst, src_port, dst_port)).unwrap()
}

// S1: a single allow rule matches exactly the tuple it names and nothing
// else.
#[test]
fn s1_single_allow_rule_matches_only_its_exact_tuple() {
    let a = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let b = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    let (a_hi, a_lo) = halves(a);
    let (b_hi, b_lo) = halves(b);

    let mut rule = Rule::new(1);
    rule.src_prefixes = vec![Prefix::new(a_hi, u64::MAX, a_lo, u64::MAX)];
    rule.dst_prefixes = vec![Prefix::new(b_hi, u64::MAX, b_lo, u64::MAX)];
    rule.dst_ports = vec![PortRange::new(443, 443)];

    let filter = AclCompiler::compile(&[rule], 0).unwrap();

    assert_eq!(filter.classify(&v6_tcp(a, b, 50000, 443)), 1);
    assert_eq!(filter.classify(&v6_tcp(a, b, 50000, 80)), 0);
    let other = "2001:db8::3".parse::<Ipv6Addr>().unwrap();
    assert_eq!(filter.classify(&v6_tcp(a, other, 50000, 443)), 0);
}

// S2: two overlapping rules resolve to the earlier (higher-priority) one on
// the overlap, and to the later rule outside it.
#[test]
fn s2_overlapping_rules_resolve_by_priority_order() {
    let net = "2001:db8::".parse::<Ipv6Addr>().unwrap();
    let (hi, lo) = halves(net);

    let mut deny_https = Rule::new(0);
    deny_https.src_prefixes = vec![Prefix::new(hi, u64::MAX, lo, 0)];
    deny_https.dst_ports = vec![PortRange::new(443, 443)];

    let mut allow_all_from_net = Rule::new(1);
    allow_all_from_net.src_prefixes = vec![Prefix::new(hi, u64::MAX, lo, 0)];

    let filter = AclCompiler::compile(&[deny_https, allow_all_from_net], 2).unwrap();

    let host = "2001:db8::5".parse::<Ipv6Addr>().unwrap();
    let dst = "2001:db8:1::1".parse::<Ipv6Addr>().unwrap();
    assert_eq!(filter.classify(&v6_tcp(host, dst, 1, 443)), 0);
    assert_eq!(filter.classify(&v6_tcp(host, dst, 1, 80)), 1);

    let outside = "2001:db9::5".parse::<Ipv6Addr>().unwrap();
    assert_eq!(filter.classify(&v6_tcp(outside, dst, 1, 80)), 2);
}

// S3: a port range matches every port inside it, inclusive of both
// endpoints, and nothing outside it.
#[test]
fn s3_port_range_is_inclusive_on_both_ends() {
    let mut rule = Rule::new(5);
    rule.dst_ports = vec![PortRange::new(8000, 8010)];
    let filter = AclCompiler::compile(&[rule], 0).unwrap();

    let a = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let b = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    for port in [8000u16, 8005, 8010] {
        assert_eq!(filter.classify(&v6_tcp(a, b, 1, port)), 5);
    }
    assert_eq!(filter.classify(&v6_tcp(a, b, 1, 7999)), 0);
    assert_eq!(filter.classify(&v6_tcp(a, b, 1, 8011)), 0);
}

// Invariant: unmatched traffic always resolves to the filter's configured
// default action, never to class 0's internal id being mistaken for one.
#[test]
fn unmatched_traffic_falls_back_to_the_configured_default_action() {
    let mut rule = Rule::new(1);
    rule.dst_ports = vec![PortRange::new(22, 22)];
    let filter = AclCompiler::compile(&[rule], 99).unwrap();

    let a = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let b = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    assert_eq!(filter.classify(&v6_tcp(a, b, 1, 23)), 99);
}

// Invariant: UDP and TCP on the same ports are classified independently of
// protocol — the cascade only looks at ports, so a rule with no explicit
// protocol constraint matches both.
#[test]
fn port_rules_match_both_tcp_and_udp() {
    let mut rule = Rule::new(1);
    rule.dst_ports = vec![PortRange::new(53, 53)];
    let filter = AclCompiler::compile(&[rule], 0).unwrap();

    let a = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
    let b = "2001:db8::2".parse::<Ipv6Addr>().unwrap();
    let tcp = parse_packet(&crate::packet::tcp_v6(a, b, 1, 53)).unwrap();
    let udp = parse_packet(&crate::packet::udp_v6(a, b, 1, 53)).unwrap();
    assert_eq!(filter.classify(&tcp), 1);
    assert_eq!(filter.classify(&udp), 1);
}

// Invariant: a rule with several disjoint prefixes matches on any of them,
// not just the first.
#[test]
fn a_rule_with_multiple_prefixes_matches_any_of_them() {
    let net_a = "2001:db8:a::".parse::<Ipv6Addr>().unwrap();
    let net_b = "2001:db8:b::".parse::<Ipv6Addr>().unwrap();
    let (a_hi, a_lo) = halves(net_a);
    let (b_hi, b_lo) = halves(net_b);

    let mut rule = Rule::new(1);
    rule.src_prefixes = vec![
        Prefix::new(a_hi, u64::MAX, a_lo, 0),
        Prefix::new(b_hi, u64::MAX, b_lo, 0),
    ];
    let filter = AclCompiler::compile(&[rule], 0).unwrap();

    let dst = "2001:db8::9".parse::<Ipv6Addr>().unwrap();
    let host_a = "2001:db8:a::7".parse::<Ipv6Addr>().unwrap();
    let host_b = "2001:db8:b::7".parse::<Ipv6Addr>().unwrap();
    let host_c = "2001:db8:c::7".parse::<Ipv6Addr>().unwrap();
    assert_eq!(filter.classify(&v6_tcp(host_a, dst, 1, 2)), 1);
    assert_eq!(filter.classify(&v6_tcp(host_b, dst, 1, 2)), 1);
    assert_eq!(filter.classify(&v6_tcp(host_c, dst, 1, 2)), 0);
}

// process() folds parse failure into the default action rather than
// panicking or propagating an error type.
#[test]
fn process_drops_unparsable_bytes_to_the_default_action() {
    let filter = AclCompiler::compile(&[Rule::new(1)], 7).unwrap();
    assert_eq!(filter.process(&[0u8; 4]), 7);
}
