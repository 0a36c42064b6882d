//! A small stub target implementation used only by this crate's own test
//! suite. Two register classes (`GPR`, `FPR`) of sixteen registers each,
//! cheap made-up costs, and a secondary reload requirement triggered only
//! for the 8-byte GPR/FPR crossing so the secondary-move planner tests have
//! something to exercise.

use crate::regset::HardRegSet;
use crate::target::{HardRegno, Mode, ReloadIcode, RegClassId, Target};

/// General-purpose class: 16 regs, hard-regnos 0..16.
pub const GPR: RegClassId = RegClassId(0);
/// Floating-point class: 16 regs, hard-regnos 16..32.
pub const FPR: RegClassId = RegClassId(1);
/// Intermediate-reload class used by the GPR/FPR 8-byte crossing.
pub const INTERM: RegClassId = RegClassId(2);

/// A made-up three-class target with just enough behavior to exercise
/// every component's tests.
#[derive(Default)]
pub struct StubTarget;

impl Target for StubTarget {
    fn num_register_classes(&self) -> u16 {
        3
    }

    fn hard_regno_nregs(&self, _regno: HardRegno, mode: Mode) -> u32 {
        ((mode.size + 3) / 4).max(1)
    }

    fn hard_regno_mode_ok(&self, _regno: HardRegno, _mode: Mode) -> bool {
        true
    }

    fn class_contents(&self, class: RegClassId) -> HardRegSet {
        let mut s = HardRegSet::empty();
        match class {
            GPR => s.insert_range(0, 16),
            FPR => s.insert_range(16, 16),
            INTERM => s.insert_range(32, 4),
            _ => {}
        }
        s
    }

    fn register_move_cost(&self, _mode: Mode, from: RegClassId, to: RegClassId) -> u32 {
        if from == to {
            2
        } else {
            4
        }
    }

    fn memory_move_cost(&self, _mode: Mode, _class: RegClassId, _load_p: bool) -> u32 {
        10
    }

    fn secondary_input_reload_class(
        &self,
        class: RegClassId,
        mode: Mode,
        from: RegClassId,
    ) -> Option<RegClassId> {
        if class != from && mode.size == 8 {
            Some(INTERM)
        } else {
            None
        }
    }

    fn secondary_output_reload_class(
        &self,
        class: RegClassId,
        mode: Mode,
        to: RegClassId,
    ) -> Option<RegClassId> {
        self.secondary_input_reload_class(class, mode, to)
    }

    fn reload_icode(&self, _mode: Mode, _in_p: bool) -> ReloadIcode {
        ReloadIcode::none()
    }

    fn secondary_memory_needed(&self, _from: RegClassId, _to: RegClassId, _mode: Mode) -> bool {
        false
    }

    fn secondary_memory_stack_align(&self, _mode: Mode) -> u32 {
        4
    }

    fn base_regs(&self, _mode: Mode) -> HardRegSet {
        self.class_contents(GPR)
    }

    fn index_regs(&self, _mode: Mode) -> HardRegSet {
        self.class_contents(GPR)
    }

    fn regno_class(&self, regno: HardRegno) -> RegClassId {
        if regno < 16 {
            GPR
        } else if regno < 32 {
            FPR
        } else {
            INTERM
        }
    }

    fn letter_class(&self, letter: char) -> Option<RegClassId> {
        match letter {
            'r' => Some(GPR),
            'f' => Some(FPR),
            _ => None,
        }
    }

    fn call_used_regs(&self) -> HardRegSet {
        let mut s = HardRegSet::empty();
        s.insert_range(8, 8);
        s
    }

    fn always_live_regs(&self) -> HardRegSet {
        HardRegSet::empty()
    }

    fn is_callee_saved(&self, regno: HardRegno) -> bool {
        (4..8).contains(&regno)
    }

    fn frame_grows_downward(&self) -> bool {
        true
    }

    fn preferred_stack_boundary(&self) -> u32 {
        16
    }
}
