//! Virtual-register eliminator (§4.8).
//!
//! Replaces references to virtual frame/argument-pointer registers with a
//! real base register plus a (possibly call-site-dependent) displacement,
//! falling back to an intermediate base register when no candidate's
//! resulting address is legitimate.

use crate::constraints::all_alt_offset_ok_p;
use crate::graph::{AllocnoId, Graph};
use crate::hardreg::{EliminationOffset, HardRegBookkeeping};
use crate::regset::HardRegSet;
use crate::target::{HardRegno, Mode, Target};
use std::collections::HashMap;

/// One real base register a virtual register may be eliminated to, and the
/// fixed part of the resulting offset.
#[derive(Clone, Copy, Debug)]
pub struct EliminationCandidate {
    /// The real base register (stack pointer, hard frame pointer, ...).
    pub to_regno: HardRegno,
    /// Fixed displacement contributed by this candidate's choice of base.
    pub base_offset: i64,
    /// Does this candidate's final offset need the current simulated
    /// stack-area size added (true for stack-pointer-relative candidates)?
    pub uses_stack_size: bool,
}

/// The set of elimination candidates for every virtual register, in the
/// order they should be tried.
pub struct EliminationTable {
    candidates: HashMap<i32, Vec<EliminationCandidate>>,
    slots: HashMap<i32, usize>,
}

impl EliminationTable {
    /// Build a table from `(virtual_regno, candidates)` pairs; each virtual
    /// register is assigned a dense bookkeeping slot in the order given.
    pub fn new(entries: Vec<(i32, Vec<EliminationCandidate>)>) -> Self {
        let mut candidates = HashMap::new();
        let mut slots = HashMap::new();
        for (i, (regno, cands)) in entries.into_iter().enumerate() {
            slots.insert(regno, i);
            candidates.insert(regno, cands);
        }
        Self { candidates, slots }
    }

    fn slot_of(&self, regno: i32) -> Option<usize> {
        self.slots.get(&regno).copied()
    }
}

/// Decode of an address operand's base/index sub-parts, supplied by the
/// caller when eliminating a non-trivial `MEM` rather than a bare
/// `PLUS(vreg, const)`.
pub struct AddressDecode {
    /// Is the allocno under elimination the index (rather than base)
    /// register of the address?
    pub is_index: bool,
    /// Scale factor applied to an index register's contribution.
    pub scale: i64,
    /// Displacement already present in the address besides the virtual
    /// register's own offset.
    pub displacement: i64,
}

/// Try every elimination candidate for `a`'s virtual register in order,
/// accepting the first whose resulting offset is legitimate.
///
/// `addr` is `None` for the simple `PLUS(vreg, const_int)` case and `Some`
/// for the general address-decode case. Both consult the constraint
/// evaluator's offset check identically, so callers never need to know
/// which path applies it.
pub fn eliminate_reg(
    graph: &mut Graph,
    target: &dyn Target,
    hw: &mut HardRegBookkeeping,
    table: &EliminationTable,
    stack_size: i64,
    a: AllocnoId,
    addr: Option<&AddressDecode>,
) -> bool {
    let regno = graph.allocno(a).regno;
    let slot = match table.slot_of(regno) {
        Some(s) => s,
        None => return false,
    };
    let candidates = match table.candidates.get(&regno) {
        Some(c) => c.as_slice(),
        None => return false,
    };

    for cand in candidates {
        let raw = cand.base_offset
            + addr.map_or(0, |a| a.displacement)
            + if cand.uses_stack_size { stack_size } else { 0 };
        let final_offset = match addr {
            Some(a) if a.is_index => raw * a.scale,
            _ => raw,
        };
        if all_alt_offset_ok_p(graph, target, a, final_offset) {
            hw.set_elimination_offset(
                slot,
                EliminationOffset {
                    to_regno: cand.to_regno,
                    offset: final_offset,
                },
            );
            if let Some(ia) = graph.allocno_mut(a).insn.as_mut() {
                ia.elimination = true;
            }
            return true;
        }
    }

    // No candidate admits a legitimate address directly; fall back to an
    // intermediate elimination register.
    assign_intermediate(graph, target, hw, a)
}

fn assign_intermediate(graph: &mut Graph, target: &dyn Target, hw: &mut HardRegBookkeeping, a: AllocnoId) -> bool {
    let mode = graph.allocno(a).allocno_mode();
    let possible_regs = target.base_regs(mode);

    // Reuse the allocno's own hard reg if it is already wide enough and in
    // a class the address can use as a base.
    if let Some(h) = graph.allocno(a).state.hard_regno {
        if possible_regs.contains(h) {
            if let Some(ia) = graph.allocno_mut(a).insn.as_mut() {
                ia.elimination = true;
                ia.interm_elimination_regno = Some(h);
            }
            return true;
        }
    }

    match find_hard_reg(target, hw, mode, &possible_regs) {
        Some(h) => {
            hw.mark_allocation(target, h, mode);
            if let Some(ia) = graph.allocno_mut(a).insn.as_mut() {
                ia.elimination = true;
                ia.interm_elimination_regno = Some(h);
                ia.interm_elimination_regset = possible_regs;
            }
            true
        }
        None => false,
    }
}

fn find_hard_reg(
    target: &dyn Target,
    hw: &HardRegBookkeeping,
    mode: Mode,
    possible_regs: &HardRegSet,
) -> Option<HardRegno> {
    for r in possible_regs.iter() {
        let nregs = target.hard_regno_nregs(r, mode);
        if target.hard_regno_mode_ok(r, mode) && hw.range_is_free(r, nregs) {
            return Some(r);
        }
    }
    None
}

/// Undo a prior `eliminate_reg`: release any intermediate register it
/// allocated and clear the allocno's elimination state.
pub fn uneliminate_reg(graph: &mut Graph, target: &dyn Target, hw: &mut HardRegBookkeeping, a: AllocnoId) {
    let mode = graph.allocno(a).allocno_mode();
    if let Some(ia) = graph.allocno_mut(a).insn.as_mut() {
        if let Some(h) = ia.interm_elimination_regno.take() {
            // Only release if we actually allocated a fresh register
            // (reused allocno hard regs are owned by the allocno itself).
            if ia.interm_elimination_regset.contains(h) {
                hw.mark_release(target, h, mode);
            }
        }
        ia.elimination = false;
        ia.interm_elimination_regset = HardRegSet::empty();
    }
}

/// Drive `eliminate_reg` over every allocno the caller identifies as
/// referencing a virtual register, invoking `on_result` with the outcome
/// of each attempt (the final instruction rewrite is the caller's own
/// responsibility; this core only decides and records the elimination).
pub fn eliminate_virtual_registers(
    graph: &mut Graph,
    target: &dyn Target,
    hw: &mut HardRegBookkeeping,
    table: &EliminationTable,
    stack_size: i64,
    allocnos: &[(AllocnoId, Option<AddressDecode>)],
    mut on_result: impl FnMut(AllocnoId, bool),
) {
    for (a, addr) in allocnos {
        let ok = eliminate_reg(graph, target, hw, table, stack_size, *a, addr.as_ref());
        on_result(*a, ok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::graph::{GraphInputs, InsnId, InsnSpec, IoMode, OperandSubClass, OperandSpec, Wrapping};
    use crate::target::Mode;
    use crate::test_support::{StubTarget, GPR};

    const SP: HardRegno = 13;
    const HFP: HardRegno = 14;
    const VFP_REGNO: i32 = -100;

    fn insn_allocno_graph() -> Graph {
        let inputs = GraphInputs {
            pseudos: vec![],
            insns: vec![InsnSpec {
                insn: InsnId::new(0),
                operands: vec![OperandSpec {
                    sub_class: OperandSubClass::BaseReg,
                    io_mode: IoMode::In,
                    mode: Mode::new(4, 4),
                    regno: VFP_REGNO,
                    wrapping: Wrapping::None,
                    tied_to: None,
                    num_alts: 1,
                    point: 0,
                    constraints: vec!["p".to_string()],
                }],
            }],
            copies: vec![],
        };
        Graph::build(&inputs)
    }

    #[test]
    fn scenario_s5_picks_smallest_offset_candidate() {
        let target = StubTarget::default();
        let mut hw = HardRegBookkeeping::new(32);
        let mut graph = insn_allocno_graph();
        let a = graph.allocno_ids().next().unwrap();

        let table = EliminationTable::new(vec![(
            VFP_REGNO,
            vec![
                EliminationCandidate {
                    to_regno: SP,
                    base_offset: 0,
                    uses_stack_size: true,
                },
                EliminationCandidate {
                    to_regno: HFP,
                    base_offset: 0,
                    uses_stack_size: false,
                },
            ],
        )]);

        let addr = AddressDecode {
            is_index: false,
            scale: 1,
            displacement: 0x1000,
        };
        assert!(eliminate_reg(&mut graph, &target, &mut hw, &table, 0, a, Some(&addr)));
        assert!(graph.allocno(a).insn.as_ref().unwrap().elimination);
        assert_eq!(hw.elimination_offset(0).unwrap().to_regno, SP);
        assert_eq!(hw.elimination_offset(0).unwrap().offset, 0x1000);
    }

    #[test]
    fn falls_back_to_intermediate_when_no_candidate() {
        let target = StubTarget::default();
        let mut hw = HardRegBookkeeping::new(32);
        let mut graph = insn_allocno_graph();
        let a = graph.allocno_ids().next().unwrap();
        let table = EliminationTable::new(vec![(VFP_REGNO, vec![])]);

        assert!(eliminate_reg(&mut graph, &target, &mut hw, &table, 0, a, None));
        let ia = graph.allocno(a).insn.as_ref().unwrap();
        assert!(ia.elimination);
        assert!(ia.interm_elimination_regno.is_some());
        assert!(target.class_contents(GPR).contains(ia.interm_elimination_regno.unwrap()));
    }
}
