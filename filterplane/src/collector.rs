//! Converts a multiset of `(prefix, mask)` pairs into a disjoint-range LPM
//! assigning each maximal equivalence class a unique id.
//!
//! This is the fusion of prefix-tree semantics with range compression that
//! lets everything downstream — [`crate::acl::AclCompiler`]'s pairwise
//! merges, the runtime classifier lookups — work over dense, disjoint
//! classes instead of raw, overlapping prefixes.

use crate::lpm64::Lpm64;
use crate::radix64::Radix64;

/// Collects `(key, mask)` pairs and compiles them into a single LPM-64
/// covering the entire 64-bit key space.
#[derive(Debug, Clone, Default)]
pub struct NetworkCollector {
    radix: Radix64,
    /// One 64-bit prefix-length bitmap per distinct key seen so far; bit
    /// `p - 1` set means "a `/p` prefix rooted at this key was added".
    masks: Vec<u64>,
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `/prefix` network at `key`. `mask == 0` (a rule that
    /// matches the entire dimension) contributes nothing and is skipped —
    /// it is equivalent to not constraining this dimension at all.
    ///
    /// `mask` must be a contiguous run of one-bits from the MSB; validating
    /// that is the caller's responsibility (see `crate::rule`).
    pub fn add(&mut self, key: u64, mask: u64) {
        if mask == 0 {
            return;
        }
        let slot = match self.radix.lookup(key) {
            Some(slot) => slot,
            None => {
                let slot = self.masks.len() as u32;
                self.masks.push(0);
                self.radix.insert(key, slot);
                slot
            }
        };
        let prefix_len = mask.count_ones();
        self.masks[slot as usize] |= 1u64 << (prefix_len - 1);
    }

    /// Compiles every registered network into a single LPM-64 partitioning
    /// `[0, 2^64)` with no gaps and no overlaps: every point is covered by
    /// exactly one emitted range, and ranges with the same set of
    /// enclosing prefixes (shortest to longest) share a value. The second
    /// element of the result is the number of distinct classes assigned —
    /// callers size a [`crate::value_table::ValueTable`] dimension with it.
    pub fn collect(self) -> (Lpm64, u32) {
        let mut lpm = Lpm64::new();
        let mut stack = vec![Frame {
            from: 0,
            to: u64::MAX,
            value: None,
        }];
        let mut next_value = 0u32;
        let mut last_to = u64::MAX;

        let masks = &self.masks;
        self.radix.iterate(|key, slot| {
            visit_key(
                &mut stack,
                &mut lpm,
                &mut next_value,
                &mut last_to,
                key,
                masks[slot as usize],
            );
        });

        while let Some(frame) = stack.pop() {
            if last_to != frame.to || next_value == 0 {
                let value = frame.value.unwrap_or(next_value);
                if frame.value.is_none() {
                    next_value += 1;
                }
                emit_range(&mut lpm, next(last_to), frame.to, value);
                last_to = frame.to;
            }
        }

        (lpm, next_value)
    }
}

struct Frame {
    from: u64,
    to: u64,
    /// Lazily assigned from `next_value` the first time this frame's tail
    /// range actually needs emitting.
    value: Option<u32>,
}

fn next(v: u64) -> u64 {
    v.wrapping_add(1)
}

fn prev(v: u64) -> u64 {
    v.wrapping_sub(1)
}

fn top_value(stack: &mut [Frame], next_value: &mut u32) -> u32 {
    let top = stack.last_mut().expect("stack is never empty during a visit");
    *top.value.get_or_insert_with(|| {
        let v = *next_value;
        *next_value += 1;
        v
    })
}

/// Processes one radix entry: a `key` and the bitmap of prefix lengths
/// rooted there, shortest prefix first.
fn visit_key(
    stack: &mut Vec<Frame>,
    lpm: &mut Lpm64,
    next_value: &mut u32,
    last_to: &mut u64,
    key: u64,
    mask_set: u64,
) {
    let mut remaining = mask_set;
    while remaining != 0 {
        let shift = remaining.trailing_zeros();
        let prefix_len = shift + 1;
        let host_mask = if prefix_len == 64 {
            0
        } else {
            u64::MAX >> prefix_len
        };
        add_network(stack, lpm, next_value, last_to, key, key | host_mask);
        remaining &= !(1u64 << shift);
    }
}

/// Pushes the interval `[from, to]` onto the stack, first unwinding and
/// emitting any frames that no longer enclose `from` and any gap between
/// the last emitted point and `from`.
fn add_network(
    stack: &mut Vec<Frame>,
    lpm: &mut Lpm64,
    next_value: &mut u32,
    last_to: &mut u64,
    from: u64,
    to: u64,
) {
    while let Some(top) = stack.last() {
        let shared_prefix_mask = !(top.to ^ top.from);
        if (from ^ top.from) & shared_prefix_mask == 0 {
            break;
        }
        if *last_to != top.to {
            let value = top_value(stack, next_value);
            let top = stack.last().unwrap();
            emit_range(lpm, next(*last_to), top.to, value);
            *last_to = top.to;
        }
        stack.pop();
    }

    if let Some(top) = stack.last() {
        if next(*last_to) != from {
            let value = top_value(stack, next_value);
            let top = stack.last().unwrap();
            let gap_to = prev(top.from);
            emit_range(lpm, next(*last_to), gap_to, value);
            *last_to = gap_to;
        }
    }

    *last_to = prev(from);
    stack.push(Frame {
        from,
        to,
        value: None,
    });
}

/// Splits `[from, to]` into the minimum number of power-of-two, alignment-
/// respecting blocks and inserts each into `lpm` with `value`.
fn emit_range(lpm: &mut Lpm64, from: u64, to: u64, value: u32) {
    if from == next(to) {
        // from == 0, to == u64::MAX: the whole key space in one range.
        lpm.insert(0, u64::MAX, value);
        return;
    }

    let mut from = from;
    loop {
        let remaining = to - from + 1;
        let alignment_exp = if from == 0 { 64 } else { from.trailing_zeros() };
        let size_exp = 63 - remaining.leading_zeros();
        let exp = alignment_exp.min(size_exp);
        let block_to = from + (1u64 << exp) - 1;
        lpm.insert(from, block_to, value);
        if block_to == to {
            break;
        }
        from = block_to + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lpm64::LookupResult;

    #[test]
    fn empty_collector_covers_everything_with_one_class() {
        let (lpm, count) = NetworkCollector::new().collect();
        assert_eq!(count, 1);
        assert_eq!(lpm.lookup(0), LookupResult::Value(0));
        assert_eq!(lpm.lookup(u64::MAX), LookupResult::Value(0));
        assert_eq!(lpm.lookup(1 << 40), LookupResult::Value(0));
    }

    #[test]
    fn single_host_route_splits_the_space_in_two_classes() {
        let mut c = NetworkCollector::new();
        c.add(0x1000_0000_0000_0000, u64::MAX); // a /64 "host" route
        let (lpm, count) = c.collect();

        let inside = lpm.lookup(0x1000_0000_0000_0000);
        let outside = lpm.lookup(0);
        assert_eq!(count, 2);
        assert_ne!(inside, outside);
        assert_eq!(lpm.lookup(u64::MAX), outside);
    }

    #[test]
    fn nested_prefixes_at_the_same_key_produce_distinct_classes() {
        let mut c = NetworkCollector::new();
        // A /8 and a /16 both rooted at the same top byte.
        let base = 0x2000_0000_0000_0000u64;
        c.add(base, 0xff00_0000_0000_0000);
        c.add(base, 0xffff_0000_0000_0000);
        let (lpm, count) = c.collect();

        let narrow = lpm.lookup(base);
        let wide_only = lpm.lookup(base | 0x0001_0000_0000_0000);
        let outside = lpm.lookup(0);
        assert_eq!(count, 3);
        assert_ne!(narrow, wide_only);
        assert_ne!(wide_only, outside);
        assert_ne!(narrow, outside);
    }

    #[test]
    fn disjoint_networks_get_disjoint_classes() {
        let mut c = NetworkCollector::new();
        c.add(0x1000_0000_0000_0000, 0xff00_0000_0000_0000);
        c.add(0x2000_0000_0000_0000, 0xff00_0000_0000_0000);
        let (lpm, count) = c.collect();

        let a = lpm.lookup(0x1000_0000_0000_0000);
        let b = lpm.lookup(0x2000_0000_0000_0000);
        let outside = lpm.lookup(0x3000_0000_0000_0000);
        assert_eq!(count, 3);
        assert_ne!(a, b);
        assert_ne!(a, outside);
        assert_ne!(b, outside);
    }

    #[test]
    fn output_ranges_partition_the_entire_space() {
        let mut c = NetworkCollector::new();
        c.add(0x1234_0000_0000_0000, 0xffff_0000_0000_0000);
        let (lpm, _count) = c.collect();

        let mut runs = Vec::new();
        lpm.walk(0, u64::MAX, |k, v| runs.push((k, v)));
        assert!(!runs.is_empty());
        // every key must resolve to a real class, none left unset.
        for k in [0u64, 1, 0x1234_0000_0000_0000, u64::MAX, 1 << 32] {
            assert!(matches!(lpm.lookup(k), LookupResult::Value(_)));
        }
    }
}
