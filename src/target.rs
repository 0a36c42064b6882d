//! Target facade.
//!
//! A thin, pure-query abstraction over the target machine's register file,
//! classes, costs and reload requirements. The allocator core never
//! hardcodes anything target-specific; every fact it needs is asked for
//! through this trait, which the embedding compiler implements against its
//! own register tables.
//!
//! No logic lives here beyond the handful of default methods that are
//! mechanically derivable from the other queries (e.g. minimal memory
//! costs as a min over register classes).

use crate::regset::HardRegSet;

/// A physical machine register number.
pub type HardRegno = u32;

/// An opaque index into the target's table of register classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RegClassId(pub u16);

/// A machine mode: the width and required alignment of a value, in bytes.
/// Stands in for the source IR's notion of a typed width (e.g. `i32`, `f64`,
/// a vector type) without the core needing to know anything about types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Mode {
    /// Size in bytes.
    pub size: u32,
    /// Required alignment in bytes (a power of two).
    pub align: u32,
}

impl Mode {
    /// Construct a mode of the given size, self-aligned.
    pub fn new(size: u32, align: u32) -> Self {
        debug_assert!(align.is_power_of_two());
        Self { size, align }
    }
}

/// The reload instruction pattern the target supplies for a secondary
/// input/output reload, describing the intermediate register class (if the
/// pattern takes one wider than the original class) and any earlyclobber
/// scratch register class the pattern requires.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReloadIcode {
    /// Class of the widened intermediate operand, if the reload pattern's
    /// operand constraint names a class other than the original.
    pub intermediate_class: Option<RegClassId>,
    /// Mode of the intermediate operand.
    pub intermediate_mode: Option<Mode>,
    /// Class of an earlyclobber scratch register the pattern names, if any.
    pub scratch_class: Option<RegClassId>,
    /// Mode of the scratch operand.
    pub scratch_mode: Option<Mode>,
}

impl ReloadIcode {
    /// No reload pattern exists (the `m`/`o` constraint letters cover this
    /// mode/class combination directly, or the target never matched one).
    pub fn none() -> Self {
        Self::default()
    }

    /// Does this icode exist at all (was a pattern found)?
    pub fn is_some(&self) -> bool {
        self.intermediate_class.is_some() || self.scratch_class.is_some()
    }
}

/// Pure lookup over target machine tables.
///
/// Implementations are expected to be cheap and side-effect free; the core
/// may call any of these methods many times per instruction during
/// constraint evaluation.
pub trait Target {
    /// Number of register classes this target defines. Classes are numbered
    /// `0..num_register_classes()`.
    fn num_register_classes(&self) -> u16;

    /// How many consecutive hard-reg numbers a value of `mode` starting at
    /// `regno` occupies.
    fn hard_regno_nregs(&self, regno: HardRegno, mode: Mode) -> u32;

    /// Is `mode` a legal mode to store starting at `regno`?
    fn hard_regno_mode_ok(&self, regno: HardRegno, mode: Mode) -> bool;

    /// The set of hard regs belonging to `class`.
    fn class_contents(&self, class: RegClassId) -> HardRegSet;

    /// Cost, in abstract units, of a register-to-register move of `mode`
    /// from `from` to `to`.
    fn register_move_cost(&self, mode: Mode, from: RegClassId, to: RegClassId) -> u32;

    /// Cost of a load (`load_p = true`) or store between memory and a
    /// register of `class`, for a value of `mode`.
    fn memory_move_cost(&self, mode: Mode, class: RegClassId, load_p: bool) -> u32;

    /// The class an input reload into `class` (from something of `mode`
    /// already holding the value in `from`) must pass through, or `None`
    /// if the move can be made directly.
    fn secondary_input_reload_class(
        &self,
        class: RegClassId,
        mode: Mode,
        from: RegClassId,
    ) -> Option<RegClassId>;

    /// The class an output reload out of `class` into `to` must pass
    /// through, or `None` if the move can be made directly.
    fn secondary_output_reload_class(
        &self,
        class: RegClassId,
        mode: Mode,
        to: RegClassId,
    ) -> Option<RegClassId>;

    /// The reload instruction pattern for `mode`, `in_p` selecting input vs.
    /// output reload, or `ReloadIcode::none()` if the target has no
    /// dedicated pattern (forcing the memory-secondary path).
    fn reload_icode(&self, mode: Mode, in_p: bool) -> ReloadIcode;

    /// Does a move of `mode` between `from` and `to` require a secondary
    /// memory buffer rather than a register-to-register path?
    fn secondary_memory_needed(&self, from: RegClassId, to: RegClassId, mode: Mode) -> bool;

    /// Required stack alignment, in bytes, of a secondary memory buffer for
    /// `mode`.
    fn secondary_memory_stack_align(&self, mode: Mode) -> u32;

    /// Hard regs usable as a base register for addressing in `mode`.
    fn base_regs(&self, mode: Mode) -> HardRegSet;

    /// Hard regs usable as an index register for addressing in `mode`.
    fn index_regs(&self, mode: Mode) -> HardRegSet;

    /// The register class `regno` belongs to (`REGNO_REG_CLASS`).
    fn regno_class(&self, regno: HardRegno) -> RegClassId;

    /// The register class named by a single constraint letter (`r` and the
    /// target's own class letters), or `None` if the letter does not name a
    /// register class on this target.
    fn letter_class(&self, letter: char) -> Option<RegClassId>;

    /// Registers clobbered by a call, per the target's calling convention.
    fn call_used_regs(&self) -> HardRegSet;

    /// Registers that must be marked ever-live unconditionally (e.g. the
    /// hard frame pointer when frame-pointer elimination is disabled).
    fn always_live_regs(&self) -> HardRegSet;

    /// Is a callee-saved register preserved across calls (and thus needs a
    /// prologue save/restore once it becomes ever-live)?
    fn is_callee_saved(&self, regno: HardRegno) -> bool;

    /// Does the simulated stack area grow toward lower addresses?
    fn frame_grows_downward(&self) -> bool;

    /// Maximum alignment the target's ABI guarantees for the stack pointer.
    fn preferred_stack_boundary(&self) -> u32;

    /// Does integer-constraint letter `letter` (one of the target-defined
    /// `I`..`P` range-constant letters) admit `offset`? Targets with no
    /// range-restricted integer constraints can accept the default, which
    /// imposes no restriction.
    fn integer_constraint_ok(&self, _letter: char, _offset: i64) -> bool {
        true
    }

    /// Minimal memory load cost for `mode`, as the lowest
    /// `memory_move_cost(mode, class, true)` over all register classes that
    /// can hold `mode` at all.
    fn minimal_memory_load_cost(&self, mode: Mode) -> u32 {
        (0..self.num_register_classes())
            .map(RegClassId)
            .filter(|&c| self.hard_regno_mode_ok(self.class_contents(c).iter().next().unwrap_or(0), mode))
            .map(|c| self.memory_move_cost(mode, c, true))
            .min()
            .unwrap_or(0)
    }

    /// Minimal memory store cost for `mode`, analogous to
    /// `minimal_memory_load_cost`.
    fn minimal_memory_store_cost(&self, mode: Mode) -> u32 {
        (0..self.num_register_classes())
            .map(RegClassId)
            .filter(|&c| self.hard_regno_mode_ok(self.class_contents(c).iter().next().unwrap_or(0), mode))
            .map(|c| self.memory_move_cost(mode, c, false))
            .min()
            .unwrap_or(0)
    }
}
