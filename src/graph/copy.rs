//! Copies: directed move edges between allocnos.

use crate::entity::entity_impl;
use crate::graph::AllocnoId;
use crate::memslot::MemSlotId;
use crate::regset::HardRegSet;
use crate::target::{HardRegno, Mode, RegClassId};

/// Reference to a copy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CopyId(u32);
entity_impl!(CopyId, "cp");

/// The secondary-reload plan for a copy whose endpoints require a cross-
/// class or memory-to-memory move the target forbids directly (§4.7).
#[derive(Clone, Default)]
pub struct SecondaryChange {
    /// Intermediate register class, if an intermediate register is needed.
    pub interm_class: Option<RegClassId>,
    /// Intermediate register's mode.
    pub interm_mode: Option<Mode>,
    /// Intermediate register's assigned hard reg, once planned.
    pub interm_regno: Option<HardRegno>,
    /// Earlyclobber scratch register class, if the reload pattern needs one.
    pub scratch_class: Option<RegClassId>,
    /// Scratch register's mode.
    pub scratch_mode: Option<Mode>,
    /// Scratch register's assigned hard reg, once planned.
    pub scratch_regno: Option<HardRegno>,
    /// Mode of the secondary memory buffer, if a memory path was chosen
    /// instead of (or as well as) intermediate/scratch regs.
    pub memory_mode: Option<Mode>,
    /// Secondary memory slot, once allocated.
    pub memory_slot: Option<MemSlotId>,
    /// Union of every hard reg this plan currently occupies (intermediate
    /// and scratch), kept alongside for cheap conflict queries.
    pub occupied: HardRegSet,
}

impl SecondaryChange {
    /// Is there nothing to do (a no-op secondary plan)?
    pub fn is_empty(&self) -> bool {
        self.interm_class.is_none() && self.scratch_class.is_none() && self.memory_mode.is_none()
    }
}

/// A directed move between allocnos, or a read-from-literal (`src = None`)
/// or write-to-sink (`dst = None`).
#[derive(Clone)]
pub struct Copy {
    /// Source allocno, or `None` for a literal source.
    pub src: Option<AllocnoId>,
    /// Destination allocno, or `None` for a discarded result.
    pub dst: Option<AllocnoId>,
    /// Execution frequency (source basic block's estimated frequency).
    pub freq: u32,
    /// A hard regno substituted as the effective source, used for early
    /// pinning when the real source allocno hasn't been assigned yet.
    pub substituted_src_hard_regno: Option<HardRegno>,
    /// The chosen mode for the move (§4.5, `get_copy_mode`).
    pub mode: Mode,
    /// The secondary-reload plan, if one was needed.
    pub secondary: Option<SecondaryChange>,
    /// Hard regs this copy's secondary plan must avoid: the union of the
    /// hard-reg conflict sets of its endpoint allocnos.
    pub hard_reg_conflicts: HardRegSet,
}

impl Copy {
    /// A fresh copy with no secondary plan yet.
    pub fn new(src: Option<AllocnoId>, dst: Option<AllocnoId>, freq: u32, mode: Mode) -> Self {
        Self {
            src,
            dst,
            freq,
            substituted_src_hard_regno: None,
            mode,
            secondary: None,
            hard_reg_conflicts: HardRegSet::empty(),
        }
    }
}
