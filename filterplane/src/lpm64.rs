//! Longest-prefix-match trie over 64-bit big-endian keys.
//!
//! Unlike [`crate::radix64::Radix64`], interior nodes may themselves carry a
//! value: [`insert`](Lpm64::insert) stamps an entire `[from..=to]` range at
//! whatever depth `from` and `to` first diverge, so a single insert can
//! cover up to `2^56` keys without descending further. [`lookup`] walks
//! until it hits such a stamped cell or an unset one.

use crate::value_table::ValueTable;

const INVALID: u32 = u32::MAX;
const VALUE_MASK: u32 = 0x7fff_ffff;
const VALUE_FLAG: u32 = 0x8000_0000;

/// Result of an [`Lpm64::lookup`]. Kept as a sum type at the API boundary
/// even though the backing store still multiplexes tag bit and value into
/// one `u32` for layout compatibility with the rest of the compiled filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Value(u32),
    Invalid,
}

impl LookupResult {
    pub fn unwrap_or(self, default: u32) -> u32 {
        match self {
            LookupResult::Value(v) => v,
            LookupResult::Invalid => default,
        }
    }
}

type Page = [u32; 256];

/// Longest-prefix-match trie. See the module docs.
#[derive(Debug, Clone)]
pub struct Lpm64 {
    pages: Vec<Page>,
}

impl Default for Lpm64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Lpm64 {
    pub fn new() -> Self {
        Self {
            pages: vec![[INVALID; 256]],
        }
    }

    fn new_page(&mut self) -> u32 {
        self.pages.push([INVALID; 256]);
        (self.pages.len() - 1) as u32
    }

    /// Maps every key in `[from..=to]` to `value`. `from` and `to` must not
    /// overlap any previously inserted range.
    pub fn insert(&mut self, from: u64, to: u64, value: u32) {
        debug_assert!(from <= to);
        let fb = from.to_be_bytes();
        let tb = to.to_be_bytes();

        let mut page = 0u32;
        let mut hop = 0usize;
        loop {
            if fb[hop] != tb[hop] {
                break;
            }
            let idx = fb[hop] as usize;
            let mut next = self.pages[page as usize][idx];
            debug_assert!(
                next & VALUE_FLAG == 0,
                "overlapping lpm64 insert at an already-stamped cell"
            );
            if next == INVALID {
                next = self.new_page();
                self.pages[page as usize][idx] = next;
            }
            page = next;
            hop += 1;
            if hop == 7 {
                break;
            }
        }

        let lo = fb[hop] as usize;
        let hi = tb[hop] as usize;
        let pg = &mut self.pages[page as usize];
        for idx in lo..=hi {
            pg[idx] = value | VALUE_FLAG;
        }
    }

    /// Looks up `key`, descending until a stamped cell or an unset one is
    /// reached. Never fails — an unset cell simply yields
    /// [`LookupResult::Invalid`].
    pub fn lookup(&self, key: u64) -> LookupResult {
        let kb = key.to_be_bytes();
        let mut page = 0u32;
        for b in kb {
            let v = self.pages[page as usize][b as usize];
            if v == INVALID {
                return LookupResult::Invalid;
            }
            if v & VALUE_FLAG != 0 {
                return LookupResult::Value(v & VALUE_MASK);
            }
            page = v;
        }
        LookupResult::Invalid
    }

    /// Visits every stamped cell whose key lies in `[from..=to]`, invoking
    /// `f(key, value)` only when `value` differs from the previous call —
    /// i.e. emits distinct maximal runs, not every individual key.
    pub fn walk(&self, from: u64, to: u64, mut f: impl FnMut(u64, u32)) {
        let fb = from.to_be_bytes();
        let tb = to.to_be_bytes();
        let mut key_bytes = [0u8; 8];
        let mut prev: Option<u32> = None;
        self.walk_rec(0, 0, &fb, &tb, true, true, &mut key_bytes, &mut prev, &mut f);
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_rec(
        &self,
        page: u32,
        depth: usize,
        fb: &[u8; 8],
        tb: &[u8; 8],
        on_lo: bool,
        on_hi: bool,
        key_bytes: &mut [u8; 8],
        prev: &mut Option<u32>,
        f: &mut impl FnMut(u64, u32),
    ) {
        let lo = if on_lo { fb[depth] } else { 0 };
        let hi = if on_hi { tb[depth] } else { 255 };
        for b in lo..=hi {
            key_bytes[depth] = b;
            let v = self.pages[page as usize][b as usize];
            if v == INVALID {
                continue;
            }
            if v & VALUE_FLAG != 0 {
                let value = v & VALUE_MASK;
                if *prev != Some(value) {
                    f(u64::from_be_bytes(*key_bytes), value);
                    *prev = Some(value);
                }
            } else if depth < 7 {
                self.walk_rec(
                    v,
                    depth + 1,
                    fb,
                    tb,
                    on_lo && b == lo,
                    on_hi && b == hi,
                    key_bytes,
                    prev,
                    f,
                );
            }
            if b == 255 {
                break;
            }
        }
    }

    /// Rewrites every stamped cell's value through `table.get(0, value)`,
    /// then collapses any page whose 256 entries all became identical and
    /// stamped, folding that single value into the parent cell and
    /// dropping the page (a no-op on storage reclamation — the page stays
    /// allocated but unreferenced).
    pub fn compact(&mut self, table: &ValueTable) {
        self.compact_rec(0, table);
    }

    /// Returns `Some(stamped_value)` if this page collapsed to a single
    /// stamped value, `None` otherwise.
    fn compact_rec(&mut self, page: u32, table: &ValueTable) -> Option<u32> {
        let snapshot = self.pages[page as usize];
        let mut first: Option<u32> = None;
        let mut monolithic = true;

        for (idx, &v) in snapshot.iter().enumerate() {
            let new_v = if v == INVALID {
                monolithic = false;
                v
            } else if v & VALUE_FLAG != 0 {
                let remapped = table.get(0, v & VALUE_MASK) | VALUE_FLAG;
                self.pages[page as usize][idx] = remapped;
                remapped
            } else {
                match self.compact_rec(v, table) {
                    Some(collapsed) => {
                        self.pages[page as usize][idx] = collapsed;
                        collapsed
                    }
                    None => {
                        monolithic = false;
                        v
                    }
                }
            };

            match first {
                None => first = Some(new_v),
                Some(f) if f != new_v => monolithic = false,
                _ => {}
            }
        }

        if monolithic {
            first.filter(|v| v & VALUE_FLAG != 0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_invalid_for_untouched_keys() {
        let lpm = Lpm64::new();
        assert_eq!(lpm.lookup(42), LookupResult::Invalid);
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut lpm = Lpm64::new();
        lpm.insert(0, 7, 5);
        lpm.insert(8, 15, 5);
        lpm.insert(16, 23, 6);

        assert_eq!(lpm.lookup(0), LookupResult::Value(5));
        assert_eq!(lpm.lookup(7), LookupResult::Value(5));
        assert_eq!(lpm.lookup(12), LookupResult::Value(5));
        assert_eq!(lpm.lookup(16), LookupResult::Value(6));
        assert_eq!(lpm.lookup(23), LookupResult::Value(6));
        assert_eq!(lpm.lookup(24), LookupResult::Invalid);
    }

    #[test]
    fn walk_emits_distinct_maximal_runs() {
        let mut lpm = Lpm64::new();
        lpm.insert(0, 7, 5);
        lpm.insert(8, 15, 5);
        lpm.insert(16, 23, 6);

        let mut calls = Vec::new();
        lpm.walk(0, 23, |k, v| calls.push((k, v)));

        assert_eq!(calls, vec![(0, 5), (16, 6)]);
    }

    #[test]
    fn walk_bounds_are_respected() {
        let mut lpm = Lpm64::new();
        lpm.insert(0, 9, 1);
        lpm.insert(10, 19, 2);
        lpm.insert(20, 29, 3);

        let mut calls = Vec::new();
        lpm.walk(5, 25, |k, v| calls.push((k, v)));
        assert_eq!(calls, vec![(5, 1), (10, 2), (20, 3)]);
    }

    #[test]
    fn compact_remaps_through_a_value_table() {
        let mut lpm = Lpm64::new();
        lpm.insert(0, 99, 0);
        lpm.insert(100, 199, 1);

        let mut table = ValueTable::new(1, 2);
        table.new_generation();
        table.touch(0, 0);
        table.new_generation();
        table.touch(0, 1);
        table.compact();

        let expect0 = table.get(0, 0);
        let expect1 = table.get(0, 1);

        lpm.compact(&table);

        assert_eq!(lpm.lookup(0), LookupResult::Value(expect0));
        assert_eq!(lpm.lookup(150), LookupResult::Value(expect1));
    }

    #[test]
    fn full_range_insert_at_root_does_not_panic() {
        let mut lpm = Lpm64::new();
        lpm.insert(0, u64::MAX, 7);
        assert_eq!(lpm.lookup(0), LookupResult::Value(7));
        assert_eq!(lpm.lookup(u64::MAX), LookupResult::Value(7));
        assert_eq!(lpm.lookup(1 << 40), LookupResult::Value(7));
    }
}
