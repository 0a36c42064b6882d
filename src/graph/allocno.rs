//! Allocnos: candidate containers for one value at one program point.

use crate::entity::{entity_impl, AltMask};
use crate::graph::{CanId, CopyId};
use crate::memslot::MemSlotId;
use crate::regset::HardRegSet;
use crate::target::{HardRegno, Mode};
use smallvec::SmallVec;

/// Allocnos usually conflict with only a handful of others; inline storage
/// avoids a heap allocation for the common case.
pub type ConflictVec = SmallVec<[AllocnoId; 4]>;
/// Most allocnos touch zero or one copy whose secondary reload could alias
/// them.
pub type CopyConflictVec = SmallVec<[CopyId; 2]>;

/// Reference to an allocno.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocnoId(u32);
entity_impl!(AllocnoId, "a");

/// Opaque reference to an instruction, as handed to the core by the IR
/// visitor callback (§6). The core never looks inside it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(u32);
entity_impl!(InsnId, "insn");

/// How an `INSN_ALLOCNO`'s location sits inside the instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandSubClass {
    /// A numbered operand of the instruction's alternatives table.
    Operand(u32),
    /// The base-register sub-part of an address operand.
    BaseReg,
    /// The index-register sub-part of an address operand.
    IndexReg,
    /// An implicit register use/def not named by any operand (e.g. a
    /// fixed clobber).
    NonOperand,
}

/// The read/write direction of an operand.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IoMode {
    /// Operand is only read.
    In,
    /// Operand is only written.
    Out,
    /// Operand is both read and written (a match-tied read-modify-write).
    InOut,
}

/// How an allocno's location is nested inside a wider container, standing
/// in for `SUBREG`/paradoxical-subreg handling without the core walking
/// real RTL (design note, §9): the IR visitor hands back a location handle
/// plus this small enum.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Wrapping {
    /// The allocno's location *is* the container; no reinterpretation
    /// needed.
    None,
    /// The allocno's value occupies `outer_size` bytes of a container
    /// starting `byte` bytes in (a `SUBREG_BYTE`).
    Subreg { byte: u32, outer_size: u32 },
}

/// Fields specific to an `INSN_ALLOCNO`: an operand or implicit register
/// slot of one instruction.
#[derive(Clone)]
pub struct InsnAllocno {
    /// The instruction this allocno's location belongs to.
    pub insn: InsnId,
    /// Which part of the instruction it is.
    pub sub_class: OperandSubClass,
    /// Read/write direction.
    pub io_mode: IoMode,
    /// How the allocno's location nests inside its container.
    pub wrapping: Wrapping,
    /// The matched operand allocno, if this operand participates in a tie.
    pub tied_allocno: Option<AllocnoId>,
    /// Is this the "original" (write) or "duplicate" (read) side of a tie?
    pub original_p: bool,
    /// Bitset of the instruction's alternatives still feasible given the
    /// current tentative assignment of every operand allocno on the insn.
    pub possible_alts: AltMask,
    /// Operand's memory location is used in place (no reload needed).
    pub use_without_change: bool,
    /// Operand is replaced by its pseudo's equivalent constant.
    pub use_equiv_const: bool,
    /// A constant operand was forced into the constant pool rather than
    /// reloaded into a register.
    pub const_pool: bool,
    /// This allocno names a virtual frame/argument-pointer register that
    /// has been (or needs to be) eliminated.
    pub elimination: bool,
    /// Chosen intermediate elimination register, if one was needed.
    pub interm_elimination_regno: Option<HardRegno>,
    /// Candidate intermediate elimination registers still open.
    pub interm_elimination_regset: HardRegSet,
}

impl InsnAllocno {
    /// A fresh `INSN_ALLOCNO` payload with no tie, no reload flags set, and
    /// `num_alts` feasible alternatives.
    pub fn new(insn: InsnId, sub_class: OperandSubClass, io_mode: IoMode, num_alts: u32) -> Self {
        Self {
            insn,
            sub_class,
            io_mode,
            wrapping: Wrapping::None,
            tied_allocno: None,
            original_p: false,
            possible_alts: AltMask::all(num_alts),
            use_without_change: false,
            use_equiv_const: false,
            const_pool: false,
            elimination: false,
            interm_elimination_regno: None,
            interm_elimination_regset: HardRegSet::empty(),
        }
    }
}

/// The currently-committed container an allocno has been assigned, or the
/// lack thereof. Kept as a small struct (rather than folded into `Allocno`
/// directly) because this is exactly the granularity the transaction log
/// snapshots and restores (§4.10).
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocnoState {
    /// Assigned hard register, if any.
    pub hard_regno: Option<HardRegno>,
    /// Assigned memory slot and byte offset within it, if any.
    pub mem_slot: Option<(MemSlotId, u32)>,
}

impl AllocnoState {
    /// Is this allocno currently unassigned?
    pub fn is_unassigned(&self) -> bool {
        self.hard_regno.is_none() && self.mem_slot.is_none()
    }
}

/// A candidate container for one value at one program point.
#[derive(Clone)]
pub struct Allocno {
    /// The allocno's own machine mode.
    pub mode: Mode,
    /// Register number: `>= 0` for a specific source-IR pseudo or hard reg,
    /// `< 0` for an anonymous temporary.
    pub regno: i32,
    /// The CAN this allocno belongs to, once CAN-forming has run.
    pub can: Option<CanId>,
    /// Other allocnos simultaneously live.
    pub conflicts: ConflictVec,
    /// Copies whose secondary reload cannot share resources with this
    /// allocno (because the copy's intermediate/scratch would alias it).
    pub copy_conflicts: CopyConflictVec,
    /// Is this value live across a call?
    pub call_crossing: bool,
    /// Committed assignment.
    pub state: AllocnoState,
    /// Present only for `INSN_ALLOCNO`s.
    pub insn: Option<InsnAllocno>,
}

impl Allocno {
    /// A fresh `PSEUDO_REG` allocno for source pseudo `regno`.
    pub fn new_pseudo(regno: i32, mode: Mode) -> Self {
        Self {
            mode,
            regno,
            can: None,
            conflicts: ConflictVec::new(),
            copy_conflicts: CopyConflictVec::new(),
            call_crossing: false,
            state: AllocnoState::default(),
            insn: None,
        }
    }

    /// A fresh `INSN_ALLOCNO`.
    pub fn new_insn(mode: Mode, regno: i32, insn: InsnAllocno) -> Self {
        Self {
            mode,
            regno,
            can: None,
            conflicts: ConflictVec::new(),
            copy_conflicts: CopyConflictVec::new(),
            call_crossing: false,
            state: AllocnoState::default(),
            insn: Some(insn),
        }
    }

    /// Is this an `INSN_ALLOCNO`?
    pub fn is_insn_allocno(&self) -> bool {
        self.insn.is_some()
    }

    /// The mode of the allocno's own location (never reinterpreted through
    /// a subreg).
    pub fn allocno_mode(&self) -> Mode {
        self.mode
    }

    /// The mode of the *container* surrounding the allocno's location: for
    /// an `INSN_ALLOCNO` wrapped in a subreg, the outer mode; otherwise the
    /// allocno's own mode.
    pub fn allocation_mode(&self) -> Mode {
        match self.insn.as_ref().map(|i| i.wrapping) {
            Some(Wrapping::Subreg { outer_size, .. }) => Mode::new(outer_size, self.mode.align),
            _ => self.mode,
        }
    }
}
