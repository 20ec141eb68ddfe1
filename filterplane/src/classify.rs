//! Runtime classification: six single-field classifiers feed a cascade of
//! five table lookups, each reading the classifiers' (and earlier lookups')
//! results out of a shared "args" vector — this is what lets the cascade be
//! data ([`FilterLookup`] descriptors) rather than a hand-written call tree.

use crate::lpm64::Lpm64;
use crate::packet::{parse_packet, NetworkHeader, ParsedHeaders, TransportHeader};
use crate::rule::Rule;
use crate::value_table::ValueTable;
use tracing::{debug, trace};

/// Extracts one field from a packet and resolves it against the matching
/// slice of a [`CompiledFilter`], producing a dense equivalence-class id.
///
/// Takes the enclosing filter by reference rather than owning its own copy
/// of the relevant table, since every classifier's table lives inside the
/// single [`CompiledFilter`] it was compiled alongside.
pub trait Classifier: std::fmt::Debug + Send + Sync {
    fn classify(&self, filter: &CompiledFilter, packet: &ParsedHeaders) -> u32;
}

macro_rules! net_classifier {
    ($name:ident, $half:ident, $lpm:ident) => {
        #[derive(Debug)]
        pub struct $name;
        impl Classifier for $name {
            fn classify(&self, filter: &CompiledFilter, packet: &ParsedHeaders) -> u32 {
                match packet.network {
                    // IPv4 carries no 5-tuple classes of its own here — it
                    // always lands in class 0 of every network dimension.
                    NetworkHeader::V4 => 0,
                    NetworkHeader::V6 { $half, .. } => {
                        filter.$lpm.lookup($half).unwrap_or(0)
                    }
                }
            }
        }
    };
}

net_classifier!(SrcNetHi, src_hi, src_hi_lpm);
net_classifier!(SrcNetLo, src_lo, src_lo_lpm);
net_classifier!(DstNetHi, dst_hi, dst_hi_lpm);
net_classifier!(DstNetLo, dst_lo, dst_lo_lpm);

macro_rules! port_classifier {
    ($name:ident, $field:ident, $table:ident) => {
        #[derive(Debug)]
        pub struct $name;
        impl Classifier for $name {
            fn classify(&self, filter: &CompiledFilter, packet: &ParsedHeaders) -> u32 {
                match packet.transport {
                    TransportHeader::Tcp { $field, .. } | TransportHeader::Udp { $field, .. } => {
                        filter.$table.get(0, $field as u32)
                    }
                    TransportHeader::Other(_) => 0,
                }
            }
        }
    };
}

port_classifier!(SrcPort, src_port, src_port_table);
port_classifier!(DstPort, dst_port, dst_port_table);

/// One stage of the lookup cascade: reads `args[first_arg]` and
/// `args[second_arg]` as `(x, y)` into `tables[table_idx]`, appending the
/// result to `args`.
///
/// The argument indices reference a fixed layout: `0..6` are the six
/// classifiers' outputs in declaration order (src-hi, dst-hi, src-lo,
/// dst-lo, src-port, dst-port); `6..` are this filter's own lookup results,
/// in lookup order. The final lookup (T12 × T3 → T123) reads its operands as
/// `(9, 8)` rather than `(8, 9)` — T3's result lands at index 8 and T12's at
/// index 9, but [`crate::acl`] builds the T123 table with T12 as the first
/// dimension, so the higher index is read first.
#[derive(Debug, Clone, Copy)]
pub struct FilterLookup {
    pub first_arg: u8,
    pub second_arg: u8,
    pub table_idx: u16,
}

/// A compiled, ready-to-run rule set.
///
/// Holds every table the classify cascade touches — four network LPMs, two
/// port tables, and the five cascade tables (T1, T2, T3, T12, T123) — plus
/// the terminal registry mapping a T123 class to the action of the rule
/// that first claimed it.
#[derive(Debug)]
pub struct CompiledFilter {
    pub(crate) rules: Vec<Rule>,
    pub(crate) default_action: u32,
    pub(crate) classifiers: Vec<Box<dyn Classifier>>,
    pub(crate) lookups: Vec<FilterLookup>,
    pub(crate) tables: Vec<ValueTable>,
    pub(crate) src_hi_lpm: Lpm64,
    pub(crate) src_lo_lpm: Lpm64,
    pub(crate) dst_hi_lpm: Lpm64,
    pub(crate) dst_lo_lpm: Lpm64,
    pub(crate) src_port_table: ValueTable,
    pub(crate) dst_port_table: ValueTable,
    /// Indexed by final T123 class id; `class_actions[0]` is always
    /// `default_action` (class 0 is "no rule claimed this cell").
    pub(crate) class_actions: Vec<u32>,
}

impl CompiledFilter {
    /// Rules this filter was compiled from, in priority order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_action(&self) -> u32 {
        self.default_action
    }

    /// Runs the six classifiers and five cascade lookups over `packet`,
    /// returning the action of the first (highest-priority) matching rule,
    /// or [`Self::default_action`] if none matched.
    pub fn classify(&self, packet: &ParsedHeaders) -> u32 {
        let mut args = Vec::with_capacity(self.classifiers.len() + self.lookups.len());
        for classifier in &self.classifiers {
            args.push(classifier.classify(self, packet));
        }
        for lookup in &self.lookups {
            let x = args[lookup.first_arg as usize];
            let y = args[lookup.second_arg as usize];
            args.push(self.tables[lookup.table_idx as usize].get(x, y));
        }
        let class = *args.last().expect("at least one lookup always runs");
        let action = self
            .class_actions
            .get(class as usize)
            .copied()
            .unwrap_or(self.default_action);
        trace!(class, action, "classified packet");
        action
    }

    /// Parses `data` and classifies it, returning [`Self::default_action`]
    /// for anything that fails to parse — parsing has no error type of its
    /// own (see [`crate::packet`]), a malformed packet is simply dropped.
    pub fn process(&self, data: &[u8]) -> u32 {
        match parse_packet(data) {
            Some(packet) => self.classify(&packet),
            None => {
                debug!(len = data.len(), "dropping unparsable packet");
                self.default_action
            }
        }
    }
}
