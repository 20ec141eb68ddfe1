//! Dense renumbering of equivalence classes with reference counting.
//!
//! A [`RemapTable`] assigns a fresh, dense id the first time a source id is
//! touched within a generation, and the same id for every subsequent touch
//! of that source id within the same generation — this is what collapses
//! cells that share "the same prior equivalence class" onto one new class.
//! Reference counts track how many live referents currently point at each
//! id so ids can be recycled once nothing points at them, and [`compact`]
//! renumbers the surviving ids into a dense `[0, live_count)` range.
//!
//! [`compact`]: RemapTable::compact

/// Sentinel meaning "no id" — mirrors the `0xFFFFFFFF` sentinel used
/// throughout the compiled filter's on-disk layout (see `spec.md` §6).
pub const INVALID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct RemapItem {
    /// Number of live referents currently mapped to this id.
    refcount: u32,
    /// Generation this item was last touched in; stale unless it equals
    /// the table's current generation.
    gen: u32,
    /// While live (`gen` current): the id this entry maps to.
    /// While free: the next entry in the free list, or [`INVALID`].
    value: u32,
}

/// Dense id renumbering table. See the module docs for the touch/compact
/// contract.
#[derive(Debug, Clone)]
pub struct RemapTable {
    gen: u32,
    items: Vec<RemapItem>,
    free_list: u32,
    compacted: bool,
}

impl RemapTable {
    /// Creates a table with one initial id (`0`) referenced by `capacity`
    /// live referents — the state a freshly zero-initialized cell grid is
    /// in before anything has been touched.
    pub fn new(capacity: u32) -> Self {
        Self {
            gen: 1,
            items: vec![RemapItem {
                refcount: capacity,
                gen: 0,
                value: 0,
            }],
            free_list: INVALID,
            compacted: false,
        }
    }

    /// Starts a new generation. Every id touched before this call is now
    /// "stale" and will be reassigned (or reused, if free) on its next
    /// touch.
    pub fn new_generation(&mut self) {
        self.gen += 1;
    }

    fn alloc_id(&mut self) -> u32 {
        if self.free_list != INVALID {
            let id = self.free_list;
            self.free_list = self.items[id as usize].value;
            self.items[id as usize] = RemapItem {
                refcount: 0,
                gen: 0,
                value: 0,
            };
            return id;
        }
        let id = self.items.len() as u32;
        self.items.push(RemapItem {
            refcount: 0,
            gen: 0,
            value: 0,
        });
        id
    }

    /// Touches `key`, returning `(value, created)`. `created` is true iff
    /// this is the first touch of `key` within the current generation.
    ///
    /// # Panics
    /// Panics if `key` is out of range, or if called after [`compact`].
    ///
    /// [`compact`]: RemapTable::compact
    pub fn touch(&mut self, key: u32) -> (u32, bool) {
        assert!(!self.compacted, "touch is not allowed after compact");
        let ki = key as usize;
        let mut created = false;
        if self.items[ki].gen != self.gen {
            let new_id = self.alloc_id();
            self.items[ki].gen = self.gen;
            self.items[ki].value = new_id;
            created = true;
        }

        let value = self.items[ki].value;
        let vi = value as usize;
        self.items[vi].refcount += 1;
        self.items[ki].refcount -= 1;
        if self.items[ki].refcount == 0 {
            self.items[ki].value = self.free_list;
            self.free_list = key;
        }

        (value, created)
    }

    /// Renumbers every live id into `[0, live_count)`, in ascending order
    /// of current id. Ids with a zero refcount are mapped to [`INVALID`].
    /// Touching is forbidden after this call.
    pub fn compact(&mut self) {
        let mut next = 0u32;
        for item in self.items.iter_mut() {
            if item.refcount != 0 {
                item.value = next;
                next += 1;
            } else {
                item.value = INVALID;
            }
        }
        self.compacted = true;
    }

    /// Looks up `key`'s compacted value. Only meaningful after [`compact`].
    ///
    /// [`compact`]: RemapTable::compact
    pub fn compacted_value(&self, key: u32) -> u32 {
        self.items[key as usize].value
    }

    /// Number of ids ever allocated (live or freed), i.e. the current size
    /// of the underlying id space.
    pub fn id_count(&self) -> u32 {
        self.items.len() as u32
    }

    #[cfg(test)]
    fn total_refcount(&self) -> u64 {
        self.items.iter().map(|i| i.refcount as u64).sum()
    }
}
