//! Secondary-move planner (§4.7).
//!
//! Decides, for a copy whose two endpoints are both already pinned to hard
//! registers, whether the target can move directly between their classes
//! or whether an intermediate register, an earlyclobber scratch, or a
//! secondary memory buffer is required, and allocates whichever is needed.

use crate::graph::{CopyId, Graph, SecondaryChange};
use crate::hardreg::HardRegBookkeeping;
use crate::memslot::MemSlotManager;
use crate::regset::HardRegSet;
use crate::target::{HardRegno, Mode, RegClassId, Target};

fn prohibited_for_copy(graph: &Graph, cp: CopyId) -> HardRegSet {
    let c = graph.copy(cp);
    let mut set = c.hard_reg_conflicts;
    for &end in [c.src, c.dst].iter().flatten() {
        for &other_cp in &graph.allocno(end).copy_conflicts {
            if other_cp != cp {
                if let Some(sc) = &graph.copy(other_cp).secondary {
                    set.union_with(&sc.occupied);
                }
            }
        }
    }
    set
}

fn find_free_in_class(
    target: &dyn Target,
    hw: &HardRegBookkeeping,
    class: RegClassId,
    mode: Mode,
    prohibited: &HardRegSet,
) -> Option<HardRegno> {
    for r in target.class_contents(class).iter() {
        let nregs = target.hard_regno_nregs(r, mode);
        if !target.hard_regno_mode_ok(r, mode) {
            continue;
        }
        if prohibited.range_is_free(r, nregs) && hw.range_is_free(r, nregs) {
            return Some(r);
        }
    }
    None
}

/// Plan (and allocate) the secondary reload for `cp`, if one is needed.
/// Returns `false` if no admissible plan exists; on failure, any hard regs
/// tentatively taken by this call are released before returning, so the
/// graph and bookkeeping are left exactly as on entry.
pub fn plan_secondary(
    graph: &mut Graph,
    target: &dyn Target,
    hw: &mut HardRegBookkeeping,
    mem: &mut MemSlotManager,
    cp: CopyId,
) -> bool {
    let (src, dst, mode) = {
        let c = graph.copy(cp);
        (c.src, c.dst, c.mode)
    };
    let (src_reg, dst_reg) = match (
        src.and_then(|a| graph.allocno(a).state.hard_regno),
        dst.and_then(|a| graph.allocno(a).state.hard_regno),
    ) {
        (Some(s), Some(d)) => (s, d),
        // Not a register-to-register move; nothing for this planner to do.
        _ => {
            graph.copy_mut(cp).secondary = None;
            return true;
        }
    };

    if src_reg == dst_reg {
        // Short-circuited even if either endpoint sits in an
        // eliminated-reg context: the move is elided entirely by the
        // engine, so there is nothing a secondary plan could do that
        // would be observed.
        graph.copy_mut(cp).secondary = None;
        return true;
    }

    let src_class = target.regno_class(src_reg);
    let dst_class = target.regno_class(dst_reg);
    let mode_via_copy = graph.get_copy_mode(cp, target);
    let mode = if mode_via_copy.size > mode.size {
        mode_via_copy
    } else {
        mode
    };

    let mut interm_class = target.secondary_output_reload_class(src_class, mode, dst_class);
    let mut in_p = false;
    if interm_class.is_none() {
        interm_class = target.secondary_input_reload_class(dst_class, mode, src_class);
        in_p = true;
    }

    let mut change = SecondaryChange::default();

    if let Some(class) = interm_class {
        let icode = target.reload_icode(mode, in_p);
        let (class, interm_mode, scratch_class, scratch_mode) = if icode.is_some() {
            (
                icode.intermediate_class.unwrap_or(class),
                icode.intermediate_mode.unwrap_or(mode),
                icode.scratch_class,
                icode.scratch_mode,
            )
        } else {
            (class, mode, None, None)
        };

        let prohibited = prohibited_for_copy(graph, cp);
        let interm_regno = match find_free_in_class(target, hw, class, interm_mode, &prohibited) {
            Some(r) => r,
            None => return false,
        };
        hw.mark_allocation(target, interm_regno, interm_mode);
        change.interm_class = Some(class);
        change.interm_mode = Some(interm_mode);
        change.interm_regno = Some(interm_regno);
        change.occupied.insert_range(interm_regno, target.hard_regno_nregs(interm_regno, interm_mode));

        if let (Some(sc_class), Some(sc_mode)) = (scratch_class, scratch_mode) {
            let prohibited = {
                let mut p = prohibited_for_copy(graph, cp);
                p.union_with(&change.occupied);
                p
            };
            match find_free_in_class(target, hw, sc_class, sc_mode, &prohibited) {
                Some(r) => {
                    hw.mark_allocation(target, r, sc_mode);
                    change.scratch_class = Some(sc_class);
                    change.scratch_mode = Some(sc_mode);
                    change.scratch_regno = Some(r);
                    change
                        .occupied
                        .insert_range(r, target.hard_regno_nregs(r, sc_mode));
                }
                None => {
                    hw.mark_release(target, interm_regno, interm_mode);
                    return false;
                }
            }
        }

        graph.copy_mut(cp).secondary = Some(change);
        return true;
    }

    if target.secondary_memory_needed(src_class, dst_class, mode) {
        if let Some(a) = src {
            if graph
                .allocno(a)
                .insn
                .as_ref()
                .is_some_and(|ia| ia.elimination)
            {
                return false;
            }
        }
        let align = target.secondary_memory_stack_align(mode);
        let slot = mem.new_slot(mode.size, align);
        mem.acquire(slot);
        mem.place(slot);
        change.memory_mode = Some(mode);
        change.memory_slot = Some(slot);
        graph.copy_mut(cp).secondary = Some(change);
        return true;
    }

    graph.copy_mut(cp).secondary = None;
    true
}

/// Inverse of `plan_secondary`: release any hard regs or memory slot the
/// copy's secondary plan holds, and clear it.
pub fn unplan_secondary(graph: &mut Graph, target: &dyn Target, hw: &mut HardRegBookkeeping, mem: &mut MemSlotManager, cp: CopyId) {
    let change = match graph.copy_mut(cp).secondary.take() {
        Some(c) => c,
        None => return,
    };
    if let (Some(r), Some(m)) = (change.interm_regno, change.interm_mode) {
        hw.mark_release(target, r, m);
    }
    if let (Some(r), Some(m)) = (change.scratch_regno, change.scratch_mode) {
        hw.mark_release(target, r, m);
    }
    if let Some(slot) = change.memory_slot {
        mem.release(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AllocnoRef, CopySpec, GraphInputs, PseudoSpec};
    use crate::test_support::StubTarget;

    fn build_cross_class_copy() -> (Graph, CopyId) {
        let inputs = GraphInputs {
            pseudos: vec![
                PseudoSpec {
                    regno: 0,
                    mode: Mode::new(8, 8),
                    live_points: vec![0],
                    call_crossing: false,
                },
                PseudoSpec {
                    regno: 1,
                    mode: Mode::new(8, 8),
                    live_points: vec![1],
                    call_crossing: false,
                },
            ],
            insns: vec![],
            copies: vec![CopySpec {
                src: Some(AllocnoRef::Pseudo(0)),
                dst: Some(AllocnoRef::Pseudo(1)),
                freq: 1,
                mode: Mode::new(8, 8),
            }],
        };
        let mut graph = Graph::build(&inputs);
        let cp = graph.copy_ids().next().unwrap();
        let ids: Vec<_> = graph.allocno_ids().collect();
        graph.allocno_mut(ids[0]).state.hard_regno = Some(0); // GPR
        graph.allocno_mut(ids[1]).state.hard_regno = Some(16); // FPR
        (graph, cp)
    }

    #[test]
    fn same_hard_reg_short_circuits() {
        let target = StubTarget::default();
        let mut hw = HardRegBookkeeping::new(64);
        let mut mem = MemSlotManager::new();
        let (mut graph, cp) = build_cross_class_copy();
        let ids: Vec<_> = graph.allocno_ids().collect();
        graph.allocno_mut(ids[1]).state.hard_regno = Some(0);
        assert!(plan_secondary(&mut graph, &target, &mut hw, &mut mem, cp));
        assert!(graph.copy(cp).secondary.is_none());
    }

    #[test]
    fn cross_class_eight_byte_move_gets_intermediate() {
        let target = StubTarget::default();
        let mut hw = HardRegBookkeeping::new(64);
        let mut mem = MemSlotManager::new();
        let (mut graph, cp) = build_cross_class_copy();
        assert!(plan_secondary(&mut graph, &target, &mut hw, &mut mem, cp));
        let sc = graph.copy(cp).secondary.clone().expect("plan expected");
        assert!(sc.interm_regno.is_some());
        assert!(hw.refcount(sc.interm_regno.unwrap()) > 0);

        unplan_secondary(&mut graph, &target, &mut hw, &mut mem, cp);
        assert!(graph.copy(cp).secondary.is_none());
        assert_eq!(hw.refcount(sc.interm_regno.unwrap()), 0);
    }
}
