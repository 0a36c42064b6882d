//! Memory-slot manager.
//!
//! Owns the set of stack-allocated spill locations: one per CAN that
//! actually spills, plus one per copy that needs a secondary move buffer.
//! Slots are reference-counted so several allocnos/copies can point at the
//! same physical bytes (e.g. all members of a CAN share its slot), and
//! coordinates opportunistic "slot moves" that lower a slot's start offset
//! once space below it frees up.

use crate::entity::{entity_impl, PrimaryMap};
use crate::stack_packer::StackPacker;

/// Reference to a memory slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemSlotId(u32);
entity_impl!(MemSlotId, "ms");

/// A stack-allocated spill location or secondary-move buffer.
#[derive(Clone)]
pub struct MemorySlot {
    /// If this slot points at a source-provided equivalent memory location
    /// rather than a fresh stack reservation, that location's identity is
    /// opaque to the core; we only need to know it exists and never
    /// participates in packing.
    pub is_equiv_existing: bool,
    /// Start offset in the simulated spill area; `None` until placed.
    pub start: Option<u32>,
    /// Size in bytes.
    pub size: u32,
    /// Required alignment in bytes.
    pub align: u32,
    /// Number of allocnos/copies currently pointing at this slot.
    pub refcount: u32,
}

impl MemorySlot {
    fn new(size: u32, align: u32, is_equiv_existing: bool) -> Self {
        Self {
            is_equiv_existing,
            start: None,
            size,
            align,
            refcount: 0,
        }
    }
}

/// Owns every `MemorySlot` and the packer backing fresh reservations.
pub struct MemSlotManager {
    slots: PrimaryMap<MemSlotId, MemorySlot>,
    packer: StackPacker,
    /// While `true`, `deallocate` defers the actual release so a
    /// surrounding transaction can be rolled back without losing a slot's
    /// identity (§4.10): released slots are kept (but unreachable) until
    /// the outermost transaction commits.
    deferred_free: bool,
    pending_frees: Vec<MemSlotId>,
}

impl MemSlotManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            slots: PrimaryMap::new(),
            packer: StackPacker::new(),
            deferred_free: false,
            pending_frees: Vec::new(),
        }
    }

    /// Reset all state (new compilation unit / new function).
    pub fn clear(&mut self) {
        self.slots.clear();
        self.packer.reset();
        self.deferred_free = false;
        self.pending_frees.clear();
    }

    /// Enter deferred-free mode: used by the outermost `start_transaction`.
    pub fn begin_deferred_free(&mut self) {
        self.deferred_free = true;
    }

    /// Leave deferred-free mode, actually releasing anything that was
    /// pending, on outermost `end_transaction` commit.
    pub fn commit_deferred_free(&mut self) {
        self.deferred_free = false;
        let pending = core::mem::take(&mut self.pending_frees);
        for id in pending {
            self.really_release(id);
        }
    }

    /// Discard any slots whose refcount is still 0 after an outermost
    /// rollback: they were never truly needed.
    pub fn discard_deferred_free(&mut self) {
        self.deferred_free = false;
        self.pending_frees.clear();
    }

    /// Allocate a fresh slot of `size`/`align` (not tied to any existing
    /// source memory), returning its id with `refcount == 0`. The caller
    /// (CAN/copy allocation) bumps the refcount via `acquire`.
    pub fn new_slot(&mut self, size: u32, align: u32) -> MemSlotId {
        self.slots.push(MemorySlot::new(size, align, false))
    }

    /// Allocate a slot tied to a pre-existing source equivalent memory
    /// location of `size` bytes (no packing participation).
    pub fn new_equiv_slot(&mut self, size: u32) -> MemSlotId {
        self.slots.push(MemorySlot::new(size, 1, true))
    }

    /// Place `slot` in the simulated stack area if it isn't an equivalent
    /// existing location and hasn't been placed yet.
    pub fn place(&mut self, slot: MemSlotId) {
        let s = &self.slots[slot];
        if s.is_equiv_existing || s.start.is_some() {
            return;
        }
        let (size, align) = (s.size, s.align);
        let start = self.packer.find_free(size, align);
        self.packer.reserve(start, size, align);
        self.packer.record_end(start + size);
        self.slots[slot].start = Some(start);
    }

    /// Increment a slot's reference count.
    pub fn acquire(&mut self, slot: MemSlotId) {
        self.slots[slot].refcount += 1;
    }

    /// Decrement a slot's reference count; if it reaches zero and the slot
    /// isn't tied to existing memory, release its packed bytes (or defer
    /// that release while a transaction is open).
    pub fn release(&mut self, slot: MemSlotId) {
        let s = &mut self.slots[slot];
        debug_assert!(s.refcount > 0);
        s.refcount -= 1;
        if s.refcount == 0 && !s.is_equiv_existing && s.start.is_some() {
            if self.deferred_free {
                self.pending_frees.push(slot);
            } else {
                self.really_release(slot);
            }
        }
    }

    fn really_release(&mut self, slot: MemSlotId) {
        let s = &mut self.slots[slot];
        if let Some(start) = s.start.take() {
            let (size, align) = (s.size, s.align);
            self.packer.release(start, size, align);
            self.packer.unrecord_end(start + size);
        }
    }

    /// Revive a slot that was pending deferred free (roll-back case): the
    /// identity and byte range are restored as they were before release.
    pub fn revive(&mut self, slot: MemSlotId, start: u32) {
        self.pending_frees.retain(|&s| s != slot);
        self.slots[slot].refcount += 1;
        self.slots[slot].start = Some(start);
        let s = &self.slots[slot];
        if !s.is_equiv_existing {
            // The bytes were never actually released (deferred), nothing to
            // re-reserve in the packer.
        }
    }

    /// Read a slot's current state.
    pub fn slot(&self, slot: MemSlotId) -> &MemorySlot {
        &self.slots[slot]
    }

    /// Directly overwrite a slot's start offset (used by `try_slot_move`
    /// and by transaction rollback to restore a snapshot).
    pub fn set_start(&mut self, slot: MemSlotId, start: Option<u32>) {
        self.slots[slot].start = start;
    }

    /// Attempt to move `slot` to a lower, still-legal start offset by
    /// pretending every byte it currently occupies is free and re-running
    /// `find_free`. Returns the new start if it moved.
    ///
    /// This only considers the slot's own bytes as freed; the caller is
    /// responsible for checking conflict relations (§4.4 algorithm note)
    /// before calling this, and for recursing into conflicting CANs/copies
    /// since their own search space may have grown.
    pub fn try_slot_move(&mut self, slot: MemSlotId) -> Option<u32> {
        let s = &self.slots[slot];
        if s.is_equiv_existing {
            return None;
        }
        let (old_start, size, align) = (s.start?, s.size, s.align);
        self.packer.release(old_start, size, align);
        let candidate = self.packer.find_free(size, align);
        if candidate < old_start {
            self.packer.reserve(candidate, size, align);
            self.packer.unrecord_end(old_start + size);
            self.packer.record_end(candidate + size);
            self.slots[slot].start = Some(candidate);
            Some(candidate)
        } else {
            self.packer.reserve(old_start, size, align);
            None
        }
    }

    /// Current size of the simulated spill area.
    pub fn area_size(&self) -> u32 {
        self.packer.area_size()
    }

    /// Current alignment of the simulated spill area.
    pub fn area_alignment(&self, preferred_stack_boundary: u32) -> u32 {
        self.packer.slot_area_alignment(preferred_stack_boundary)
    }
}

impl Default for MemSlotManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s6_compaction() {
        // Three conflict-free CANs of sizes 4, 8, 4, alignment 4.
        let mut mgr = MemSlotManager::new();
        let c1 = mgr.new_slot(4, 4);
        let c2 = mgr.new_slot(8, 4);
        let c3 = mgr.new_slot(4, 4);

        mgr.acquire(c1);
        mgr.place(c1);
        mgr.acquire(c2);
        mgr.place(c2);
        mgr.acquire(c3);
        mgr.place(c3);

        assert_eq!(mgr.slot(c1).start, Some(0));
        assert_eq!(mgr.slot(c2).start, Some(4));
        assert_eq!(mgr.slot(c3).start, Some(12));
        assert_eq!(mgr.area_size(), 16);

        mgr.release(c2);
        assert_eq!(mgr.slot(c2).start, None);

        let moved = mgr.try_slot_move(c3);
        assert_eq!(moved, Some(4));
        assert_eq!(mgr.area_size(), 8);
    }
}
