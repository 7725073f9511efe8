//! Generational slot arena backing the heap's region and reference tables.
//!
//! Storage is a `Vec` of slots plus an explicit free list. A [`SlotId`]
//! carries the slot's generation at insertion time; removing a slot bumps
//! the generation, so any id that outlives its slot fails lookup instead of
//! aliasing whatever the slot was reused for. Insertion and removal are
//! O(1) and ids stay stable for the lifetime of the value.

/// Handle to an occupied slot.
///
/// `SlotId::NULL` is the invalid sentinel: it never matches a live slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SlotId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl SlotId {
    pub(crate) const NULL: SlotId = SlotId {
        index: u32::MAX,
        generation: 0,
    };

    pub(crate) fn is_null(self) -> bool {
        self.index == u32::MAX
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Slot arena with an explicit free list and generation-checked ids.
pub(crate) struct Slab<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Slab<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Number of occupied slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert a value, reusing a vacant slot when one exists.
    ///
    /// Returns `None` if growing the backing storage fails; the slab is
    /// unchanged in that case.
    pub(crate) fn try_insert(&mut self, value: T) -> Option<SlotId> {
        let id = match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let (generation, next_free) = match slot {
                    Slot::Vacant {
                        generation,
                        next_free,
                    } => (*generation, *next_free),
                    Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
                };
                *slot = Slot::Occupied { generation, value };
                self.free_head = next_free;
                SlotId { index, generation }
            }
            None => {
                if self.slots.len() >= u32::MAX as usize || self.slots.try_reserve(1).is_err() {
                    return None;
                }
                let index = self.slots.len() as u32;
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    value,
                });
                SlotId {
                    index,
                    generation: 0,
                }
            }
        };
        self.len += 1;
        Some(id)
    }

    pub(crate) fn get(&self, id: SlotId) -> Option<&T> {
        match self.slots.get(id.index as usize) {
            Some(Slot::Occupied { generation, value }) if *generation == id.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Look up an occupied slot by bare index, ignoring generations.
    ///
    /// Used for intrusive-list traversal, where indices are only ever read
    /// out of live sibling nodes.
    pub(crate) fn by_index(&self, index: u32) -> Option<&T> {
        match self.slots.get(index as usize) {
            Some(Slot::Occupied { value, .. }) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn by_index_mut(&mut self, index: u32) -> Option<&mut T> {
        match self.slots.get_mut(index as usize) {
            Some(Slot::Occupied { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Remove the slot `id` refers to, bumping its generation.
    pub(crate) fn remove(&mut self, id: SlotId) -> Option<T> {
        match self.slots.get(id.index as usize) {
            Some(Slot::Occupied { generation, .. }) if *generation == id.generation => {
                self.remove_at(id.index)
            }
            _ => None,
        }
    }

    /// Remove an occupied slot by bare index (internal list surgery only).
    pub(crate) fn remove_at(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if matches!(slot, Slot::Vacant { .. }) {
            return None;
        }
        let generation = match slot {
            Slot::Occupied { generation, .. } => *generation,
            Slot::Vacant { .. } => unreachable!(),
        };
        let vacant = Slot::Vacant {
            generation: generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let value = match std::mem::replace(slot, vacant) {
            Slot::Occupied { value, .. } => value,
            Slot::Vacant { .. } => unreachable!(),
        };
        self.free_head = Some(index);
        self.len -= 1;
        Some(value)
    }

    /// Drop every occupied slot, bumping each one's generation so ids
    /// taken before the clear stay stale, and rebuild the free list.
    pub(crate) fn clear(&mut self) {
        self.free_head = None;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let generation = match slot {
                Slot::Occupied { generation, .. } => generation.wrapping_add(1),
                Slot::Vacant { generation, .. } => *generation,
            };
            *slot = Slot::Vacant {
                generation,
                next_free: self.free_head,
            };
            self.free_head = Some(index as u32);
        }
        self.len = 0;
    }
}
