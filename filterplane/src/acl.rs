//! Compiles a [`Rule`] set into a [`CompiledFilter`].
//!
//! The cascade is built bottom-up: four network dimensions (src/dst × hi/lo)
//! and two port dimensions are each collected into an LPM or table plus a
//! per-rule [`ValueRegistry`] of the classes that rule's match spans touch.
//! Pairs of registries are then merged pairwise — (src-hi, dst-hi) → T1,
//! (src-lo, dst-lo) → T2, (src-port, dst-port) → T3, (T1, T2) → T12 — until
//! a final first-match-wins combine of (T12, T3) produces T123, whose cells
//! resolve directly to an action.

use crate::classify::{
    Classifier, CompiledFilter, DstNetHi, DstNetLo, DstPort, FilterLookup, SrcNetHi, SrcNetLo,
    SrcPort,
};
use crate::collector::NetworkCollector;
use crate::error::CompileError;
use crate::lpm64::Lpm64;
use crate::registry::ValueRegistry;
use crate::rule::{Prefix, PortRange, Rule};
use crate::value_table::ValueTable;
use tracing::debug;

/// Number of distinct L4 ports — both port dimensions span the full u16
/// range regardless of how few distinct ports any rule actually names.
const PORT_SPACE: u32 = 1 << 16;

/// Compiles [`Rule`] sets into a runtime-ready [`CompiledFilter`].
pub struct AclCompiler;

impl AclCompiler {
    /// Validates every rule, then compiles them in priority order —
    /// `rules[0]` is checked first and wins any tie. Compilation is
    /// transactional: a [`CompileError`] means nothing was built.
    pub fn compile(rules: &[Rule], default_action: u32) -> Result<CompiledFilter, CompileError> {
        for rule in rules {
            rule.validate()?;
        }

        let (src_hi_lpm, src_hi_reg) =
            collect_network_values(rules, |r| &r.src_prefixes, |p| (p.hi, p.hi_mask));
        let (dst_hi_lpm, dst_hi_reg) =
            collect_network_values(rules, |r| &r.dst_prefixes, |p| (p.hi, p.hi_mask));
        let (src_lo_lpm, src_lo_reg) =
            collect_network_values(rules, |r| &r.src_prefixes, |p| (p.lo, p.lo_mask));
        let (dst_lo_lpm, dst_lo_reg) =
            collect_network_values(rules, |r| &r.dst_prefixes, |p| (p.lo, p.lo_mask));

        let (src_port_table, src_port_reg) = collect_port_values(rules, |r| &r.src_ports);
        let (dst_port_table, dst_port_reg) = collect_port_values(rules, |r| &r.dst_ports);

        let (t1, t1_reg) = merge_and_collect_registry(&src_hi_reg, &dst_hi_reg, "src/dst-hi")?;
        let (t2, t2_reg) = merge_and_collect_registry(&src_lo_reg, &dst_lo_reg, "src/dst-lo")?;
        let (t3, t3_reg) = merge_and_collect_registry(&src_port_reg, &dst_port_reg, "src/dst-port")?;
        let (t12, t12_reg) = merge_and_collect_registry(&t1_reg, &t2_reg, "network")?;

        let actions: Vec<u32> = rules.iter().map(|r| r.action).collect();
        let (t123, class_actions) = set_registry_values(
            &t12_reg,
            &t3_reg,
            rules.len() as u32,
            default_action,
            &actions,
        )?;

        debug!(
            rules = rules.len(),
            classes = class_actions.len(),
            "compiled acl filter"
        );

        let classifiers: Vec<Box<dyn Classifier>> = vec![
            Box::new(SrcNetHi),
            Box::new(DstNetHi),
            Box::new(SrcNetLo),
            Box::new(DstNetLo),
            Box::new(SrcPort),
            Box::new(DstPort),
        ];

        // See `FilterLookup`'s docs for why T123's operands read (9, 8).
        let lookups = vec![
            FilterLookup { first_arg: 0, second_arg: 1, table_idx: 0 },
            FilterLookup { first_arg: 2, second_arg: 3, table_idx: 1 },
            FilterLookup { first_arg: 4, second_arg: 5, table_idx: 2 },
            FilterLookup { first_arg: 6, second_arg: 7, table_idx: 3 },
            FilterLookup { first_arg: 9, second_arg: 8, table_idx: 4 },
        ];

        Ok(CompiledFilter {
            rules: rules.to_vec(),
            default_action,
            classifiers,
            lookups,
            tables: vec![t1, t2, t3, t12, t123],
            src_hi_lpm,
            src_lo_lpm,
            dst_hi_lpm,
            dst_lo_lpm,
            src_port_table,
            dst_port_table,
            class_actions,
        })
    }
}

/// Builds one dimension's LPM (src or dst, hi or lo half, picked by
/// `prefixes_of`/`half`) and the per-rule registry of classes it touches.
fn collect_network_values(
    rules: &[Rule],
    prefixes_of: impl Fn(&Rule) -> &[Prefix],
    half: impl Fn(&Prefix) -> (u64, u64),
) -> (Lpm64, ValueRegistry) {
    let mut collector = NetworkCollector::new();
    for rule in rules {
        for prefix in prefixes_of(rule) {
            let (key, mask) = half(prefix);
            collector.add(key & mask, mask);
        }
    }
    let (mut lpm, class_count) = collector.collect();

    // Touch pass: collapse, per rule, the classes its prefixes span into
    // fresh equivalence classes shared across rules that touch exactly the
    // same set — this is what keeps T1/T2 small instead of one class per
    // raw (src-class, dst-class) pair ever seen.
    let mut table = ValueTable::new(1, class_count.max(1));
    for rule in rules {
        table.new_generation();
        for prefix in prefixes_of(rule) {
            let (key, mask) = half(prefix);
            let (from, to) = prefix_range(key, mask);
            lpm.walk(from, to, |_, class_id| {
                table.touch(0, class_id);
            });
        }
    }
    table.compact();
    lpm.compact(&table);

    let mut registry = ValueRegistry::new();
    for rule in rules {
        registry.start();
        for prefix in prefixes_of(rule) {
            let (key, mask) = half(prefix);
            let (from, to) = prefix_range(key, mask);
            lpm.walk(from, to, |_, value| registry.collect(value));
        }
    }

    (lpm, registry)
}

fn prefix_range(key: u64, mask: u64) -> (u64, u64) {
    if mask == 0 {
        (0, u64::MAX)
    } else {
        (key, key | !mask)
    }
}

/// Builds a 65536-entry port table and the per-rule registry of classes it
/// touches. A rule's touch pass skips port ranges spanning the entire
/// space — touching all 65536 cells for a "match any port" clause buys
/// nothing, every cell would just join class 0 — but the registry pass
/// still walks those ranges in full, since the rule's full set of matched
/// classes (needed for the cross-product merges downstream) does include
/// them.
fn collect_port_values(
    rules: &[Rule],
    ports_of: impl Fn(&Rule) -> &[PortRange],
) -> (ValueTable, ValueRegistry) {
    let mut table = ValueTable::new(1, PORT_SPACE);
    for rule in rules {
        table.new_generation();
        for range in ports_of(rule) {
            if range.is_full() {
                continue;
            }
            for port in range.from..=range.to {
                table.touch(0, port as u32);
            }
        }
    }
    table.compact();

    let mut registry = ValueRegistry::new();
    for rule in rules {
        registry.start();
        for range in ports_of(rule) {
            for port in range.from..=range.to {
                registry.collect(table.get(0, port as u32));
            }
        }
    }

    (table, registry)
}

/// Merges two registries built over the same rule ordering into a table
/// sized `(reg1.capacity(), reg2.capacity())` and a registry of the classes
/// each rule's cross-product of values touches in the merged table.
///
/// `dimension` names the merge stage for
/// [`CompileError::ClassCountOverflow`] — the product of two dimensions'
/// class counts is where overflow actually becomes reachable, not either
/// dimension alone.
fn merge_and_collect_registry(
    reg1: &ValueRegistry,
    reg2: &ValueRegistry,
    dimension: &'static str,
) -> Result<(ValueTable, ValueRegistry), CompileError> {
    debug_assert_eq!(reg1.range_count(), reg2.range_count());
    let rule_count = reg1.range_count();

    let h_dim = reg1.capacity().max(1);
    let v_dim = reg2.capacity().max(1);
    check_class_count(h_dim, v_dim, dimension)?;

    let mut table = ValueTable::new(h_dim, v_dim);
    for rule_idx in 0..rule_count {
        table.new_generation();
        reg1.join_range(reg2, rule_idx, |v1, v2, _| {
            table.touch(v1, v2);
        });
    }
    table.compact();

    let mut registry = ValueRegistry::new();
    for rule_idx in 0..rule_count {
        registry.start();
        reg1.join_range(reg2, rule_idx, |v1, v2, _| {
            registry.collect(table.get(v1, v2));
        });
    }

    Ok((table, registry))
}

/// Returns [`CompileError::ClassCountOverflow`] if an `h_dim × v_dim` table
/// would need more cells than a `u32` index can address.
fn check_class_count(h_dim: u32, v_dim: u32, dimension: &'static str) -> Result<(), CompileError> {
    if h_dim as u64 * v_dim as u64 > u32::MAX as u64 {
        return Err(CompileError::ClassCountOverflow { dimension });
    }
    Ok(())
}

/// Combines T12 and T3 into T123 under first-match-wins semantics: a cell
/// is claimed by the first (lowest-index, highest-priority) rule whose
/// cross-product of values covers it, and every other rule that later
/// touches the same cell is ignored.
///
/// The original this is ported from indexes a values-registry directly by
/// a remap table's dense id, which is only safe if that id is never
/// recycled mid-algorithm. Rather than carry that assumption forward, this
/// builds each rule's winning class on demand and keeps an explicit
/// `class_actions` vector as the terminal registry, so correctness doesn't
/// depend on how the id space happens to be allocated.
fn set_registry_values(
    t12_reg: &ValueRegistry,
    t3_reg: &ValueRegistry,
    rule_count: u32,
    default_action: u32,
    actions: &[u32],
) -> Result<(ValueTable, Vec<u32>), CompileError> {
    let h_dim = t12_reg.capacity().max(1);
    let v_dim = t3_reg.capacity().max(1);
    check_class_count(h_dim, v_dim, "terminal")?;
    let mut cells = vec![0u32; (h_dim as u64 * v_dim as u64) as usize];

    // class_actions[0] is the "unclaimed" class: falls through to the
    // default action.
    let mut class_actions = vec![default_action];
    let mut class_of_rule: Vec<Option<u32>> = vec![None; rule_count as usize];

    for rule_idx in 0..rule_count {
        t12_reg.join_range(t3_reg, rule_idx, |t12_class, t3_class, _| {
            let idx = (t3_class * h_dim + t12_class) as usize;
            if cells[idx] != 0 {
                return; // an earlier, higher-priority rule already claimed it
            }
            let class = *class_of_rule[rule_idx as usize].get_or_insert_with(|| {
                let id = class_actions.len() as u32;
                class_actions.push(actions[rule_idx as usize]);
                id
            });
            cells[idx] = class;
        });
    }

    Ok((ValueTable::from_cells(h_dim, v_dim, cells), class_actions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{NetworkHeader, ParsedHeaders, TransportHeader};
    use crate::rule::PortRange;

    fn v6_packet(src_hi: u64, src_lo: u64, dst_hi: u64, dst_lo: u64, port: u16) -> ParsedHeaders {
        ParsedHeaders {
            vlan: None,
            network: NetworkHeader::V6 {
                src_hi,
                src_lo,
                dst_hi,
                dst_lo,
            },
            network_offset: 14,
            transport: TransportHeader::Tcp {
                src_port: 1234,
                dst_port: port,
            },
            transport_offset: 14 + 40,
        }
    }

    #[test]
    fn a_single_allow_rule_matches_its_exact_tuple() {
        let mut rule = Rule::new(42);
        rule.dst_ports = vec![PortRange::new(80, 80)];
        let filter = AclCompiler::compile(&[rule], 0).unwrap();

        let hit = v6_packet(0x2001_db8_0000_0000, 1, 0x2001_db8_0000_0001, 2, 80);
        let miss = v6_packet(0x2001_db8_0000_0000, 1, 0x2001_db8_0000_0001, 2, 81);

        assert_eq!(filter.classify(&hit), 42);
        assert_eq!(filter.classify(&miss), 0);
    }

    #[test]
    fn earlier_rules_win_overlap_ties() {
        let mut specific = Rule::new(1);
        specific.dst_ports = vec![PortRange::new(80, 80)];
        let general = Rule::new(2);

        let filter = AclCompiler::compile(&[specific, general], 0).unwrap();
        let on_80 = v6_packet(1, 2, 3, 4, 80);
        let on_81 = v6_packet(1, 2, 3, 4, 81);

        assert_eq!(filter.classify(&on_80), 1);
        assert_eq!(filter.classify(&on_81), 2);
    }

    #[test]
    fn a_port_range_matches_every_port_inside_it() {
        let mut rule = Rule::new(7);
        rule.dst_ports = vec![PortRange::new(1000, 2000)];
        let filter = AclCompiler::compile(&[rule], 0).unwrap();

        assert_eq!(filter.classify(&v6_packet(1, 2, 3, 4, 1000)), 7);
        assert_eq!(filter.classify(&v6_packet(1, 2, 3, 4, 1500)), 7);
        assert_eq!(filter.classify(&v6_packet(1, 2, 3, 4, 2000)), 7);
        assert_eq!(filter.classify(&v6_packet(1, 2, 3, 4, 2001)), 0);
    }

    #[test]
    fn class_count_overflow_is_caught_before_a_table_is_allocated() {
        assert!(check_class_count(u32::MAX, 2, "test").is_err());
        assert!(check_class_count(1 << 16, 1 << 16, "test").is_ok());
    }

    #[test]
    fn non_contiguous_mask_is_rejected_before_anything_is_built() {
        use crate::rule::Prefix;
        let mut rule = Rule::new(1);
        rule.src_prefixes = vec![Prefix::new(0, 0x1, 0, 0)];
        assert!(matches!(
            AclCompiler::compile(&[rule], 0),
            Err(CompileError::NonContiguousMask { .. })
        ));
    }

    #[test]
    fn ipv4_packets_classify_through_the_zero_class_of_every_dimension() {
        // IPv4 isn't given its own address classes — every network
        // classifier stubs to class 0 for it — so a catch-all rule (whose
        // "any" prefix also occupies class 0) still matches, while a rule
        // scoped to a specific, non-zero-class network does not.
        let catch_all = Rule::new(9);
        let filter = AclCompiler::compile(&[catch_all], 0).unwrap();
        let packet = ParsedHeaders {
            vlan: None,
            network: NetworkHeader::V4,
            network_offset: 14,
            transport: TransportHeader::Tcp {
                src_port: 1,
                dst_port: 2,
            },
            transport_offset: 14 + 20,
        };
        assert_eq!(filter.classify(&packet), 9);

        let mut scoped = Rule::new(1);
        scoped.src_prefixes = vec![Prefix::new(0x2001_db8_0000_0000, u64::MAX, 0, 0)];
        let filter = AclCompiler::compile(&[scoped], 0).unwrap();
        assert_eq!(filter.classify(&packet), 0);
    }
}
