//! Rectangular grid of remap-table keys, addressable by `(x, y)`.

use crate::remap::RemapTable;

/// A `h_dim × v_dim` grid of dense ids, each of which can be reassigned into
/// a fresh equivalence class for the current generation via [`touch`].
///
/// [`touch`]: ValueTable::touch
#[derive(Debug, Clone)]
pub struct ValueTable {
    remap: RemapTable,
    h_dim: u32,
    v_dim: u32,
    cells: Vec<u32>,
}

impl ValueTable {
    pub fn new(h_dim: u32, v_dim: u32) -> Self {
        let capacity = h_dim as u64 * v_dim as u64;
        assert!(capacity <= u32::MAX as u64, "value table too large");
        Self {
            remap: RemapTable::new(capacity as u32),
            h_dim,
            v_dim,
            cells: vec![0; capacity as usize],
        }
    }

    pub fn h_dim(&self) -> u32 {
        self.h_dim
    }

    pub fn v_dim(&self) -> u32 {
        self.v_dim
    }

    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.h_dim && y < self.v_dim);
        (y * self.h_dim + x) as usize
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.cells[self.index(x, y)]
    }

    /// Reassigns cell `(x, y)` into the equivalence class that all other
    /// cells sharing its current value have been assigned to in this
    /// generation, minting a fresh class on first touch. Returns whether a
    /// fresh class was minted.
    pub fn touch(&mut self, x: u32, y: u32) -> bool {
        let idx = self.index(x, y);
        let (value, created) = self.remap.touch(self.cells[idx]);
        self.cells[idx] = value;
        created
    }

    pub fn new_generation(&mut self) {
        self.remap.new_generation();
    }

    /// Compacts the underlying remap table, then rewrites every cell
    /// through the resulting mapping.
    pub fn compact(&mut self) {
        self.remap.compact();
        for cell in self.cells.iter_mut() {
            *cell = self.remap.compacted_value(*cell);
        }
    }

    /// Builds a table directly from already-final cell values, bypassing
    /// the touch/compact machinery entirely. Used for the terminal
    /// first-match-wins combine in [`crate::acl`], whose cell values are
    /// minted by a dedicated pass rather than collapsed from prior classes.
    /// `get` works as normal; `touch`/`compact` must not be called on the
    /// result.
    pub(crate) fn from_cells(h_dim: u32, v_dim: u32, cells: Vec<u32>) -> Self {
        debug_assert_eq!(cells.len() as u64, h_dim as u64 * v_dim as u64);
        Self {
            remap: RemapTable::new(0),
            h_dim,
            v_dim,
            cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_pre_compaction_classes_stay_distinct() {
        let mut t = ValueTable::new(3, 1);
        t.new_generation();
        t.touch(0, 0);
        t.new_generation();
        t.touch(1, 0);
        t.new_generation();
        t.touch(2, 0);

        let pre = [t.get(0, 0), t.get(1, 0), t.get(2, 0)];
        assert_ne!(pre[0], pre[1]);
        assert_ne!(pre[1], pre[2]);
        assert_ne!(pre[0], pre[2]);

        t.compact();

        let post = [t.get(0, 0), t.get(1, 0), t.get(2, 0)];
        let mut sorted = post;
        sorted.sort_unstable();
        assert_eq!(sorted, [0, 1, 2]);
    }

    #[test]
    fn cells_sharing_a_generation_and_source_share_a_class() {
        let mut t = ValueTable::new(2, 1);
        t.new_generation();
        t.touch(0, 0);
        t.touch(1, 0);
        assert_eq!(t.get(0, 0), t.get(1, 0));
    }
}
