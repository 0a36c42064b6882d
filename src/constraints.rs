//! Constraint evaluator (§4.6).
//!
//! Decides, for an instruction's operand allocnos and their current or
//! proposed locations, which of the instruction's alternatives remain
//! feasible. Operates entirely off data already on the graph (operand
//! constraint strings, operand locations); it never touches hard-register
//! bookkeeping or memory slots itself.

use crate::entity::AltMask;
use crate::graph::{AllocnoId, Graph, OperandSubClass};
use crate::regset::HardRegSet;
use crate::target::{HardRegno, Mode, Target};
use std::collections::HashMap;

/// The semantic bucket a single constraint-string character falls into:
/// one small enum and a parser loop instead of a macro-expanded switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConstraintKind {
    /// A register class letter (`r` or a target class letter).
    Class(crate::target::RegClassId),
    /// `m`, `o`, `V`: a memory operand.
    Memory,
    /// `p`: an address operand (legal base or index register).
    Address,
    /// `i`, `n`, `s`, or an integer-range letter `I`..`P`: a constant.
    Immediate,
    /// `E`..`H`: a floating-point constant.
    FloatImmediate,
    /// A decimal digit: must match the location of that numbered operand.
    MatchedDigit(u32),
    /// `g`: general operand (register, memory, or immediate).
    General,
    /// `X`: anything at all is acceptable.
    Any,
}

/// Parse one alternative's constraint string into its semantic buckets,
/// applying `#` (stop), `*` (skip the next letter), and `?`/`!`/`=`/`+`
/// (preference/direction markers, which do not gate feasibility).
fn parse_constraint(s: &str, target: &dyn Target) -> Vec<ConstraintKind> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '#' => break,
            '*' => {
                chars.next();
            }
            '?' | '!' | '=' | '+' => {}
            'm' | 'o' | 'V' => out.push(ConstraintKind::Memory),
            'p' => out.push(ConstraintKind::Address),
            'i' | 'n' | 's' => out.push(ConstraintKind::Immediate),
            'I'..='P' => out.push(ConstraintKind::Immediate),
            'E'..='H' => out.push(ConstraintKind::FloatImmediate),
            'g' => out.push(ConstraintKind::General),
            'X' => out.push(ConstraintKind::Any),
            '0'..='9' => out.push(ConstraintKind::MatchedDigit(c.to_digit(10).unwrap())),
            letter => {
                if let Some(class) = target.letter_class(letter) {
                    out.push(ConstraintKind::Class(class));
                }
            }
        }
    }
    out
}

/// An operand allocno's current (or tentatively proposed) resolved
/// location, the unit the constraint buckets are tested against.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Loc {
    Reg(HardRegno),
    Memory,
    EquivConst,
    Unassigned,
}

fn resolve_loc(graph: &Graph, a: AllocnoId) -> Loc {
    let alloc = graph.allocno(a);
    if let Some(ia) = alloc.insn.as_ref() {
        if ia.use_equiv_const {
            return Loc::EquivConst;
        }
        if ia.use_without_change {
            return Loc::Memory;
        }
    }
    match alloc.state.hard_regno {
        Some(h) => Loc::Reg(h),
        None => {
            if alloc.state.mem_slot.is_some() {
                Loc::Memory
            } else {
                Loc::Unassigned
            }
        }
    }
}

fn loc_eq(a: Loc, b: Loc) -> bool {
    a == b
}

fn bucket_satisfied(
    bucket: ConstraintKind,
    loc: Loc,
    mode: Mode,
    target: &dyn Target,
    digit_locs: &HashMap<u32, Loc>,
) -> bool {
    match bucket {
        ConstraintKind::Class(c) => matches!(loc, Loc::Reg(h) if target.class_contents(c).contains(h)),
        ConstraintKind::Memory => matches!(loc, Loc::Memory),
        ConstraintKind::Address => match loc {
            Loc::Reg(h) => target.base_regs(mode).contains(h) || target.index_regs(mode).contains(h),
            _ => false,
        },
        ConstraintKind::Immediate | ConstraintKind::FloatImmediate => matches!(loc, Loc::EquivConst),
        ConstraintKind::MatchedDigit(n) => digit_locs.get(&n).is_some_and(|&other| loc_eq(loc, other)),
        ConstraintKind::General => !matches!(loc, Loc::Unassigned),
        ConstraintKind::Any => true,
    }
}

/// Map each declared operand number on the instruction containing `a` to
/// its resolved location, for matched-digit lookups.
fn digit_locs(graph: &Graph, insn_allocnos: &[AllocnoId]) -> HashMap<u32, Loc> {
    let mut map = HashMap::new();
    for &id in insn_allocnos {
        if let Some(ia) = graph.allocno(id).insn.as_ref() {
            if let OperandSubClass::Operand(n) = ia.sub_class {
                map.insert(n, resolve_loc(graph, id));
            }
        }
    }
    map
}

fn operand_alt_mask(graph: &Graph, target: &dyn Target, a: AllocnoId, digits: &HashMap<u32, Loc>) -> AltMask {
    let mode = graph.allocno(a).allocno_mode();
    let loc = resolve_loc(graph, a);
    let constraints = graph.operand_constraints(a);
    let mut mask = AltMask::none();
    for (i, s) in constraints.iter().enumerate() {
        let buckets = parse_constraint(s, target);
        if buckets
            .iter()
            .any(|&b| bucket_satisfied(b, loc, mode, target, digits))
        {
            mask.0 |= 1 << i;
        }
    }
    mask
}

/// Recompute and store `possible_alts` for every allocno in
/// `insn_allocnos`, from each one's current resolved location. Returns
/// `false` (P5 violation) if the whole-instruction intersection is empty.
pub fn recompute_possible_alts(graph: &mut Graph, target: &dyn Target, insn_allocnos: &[AllocnoId]) -> bool {
    let digits = digit_locs(graph, insn_allocnos);
    let mut combined: Option<AltMask> = None;
    let mut masks = Vec::with_capacity(insn_allocnos.len());
    for &id in insn_allocnos {
        if graph.allocno(id).insn.is_none() {
            continue;
        }
        let mask = operand_alt_mask(graph, target, id, &digits);
        combined = Some(match combined {
            Some(c) => c.intersect(mask),
            None => mask,
        });
        masks.push((id, mask));
    }
    for (id, mask) in masks {
        if let Some(ia) = graph.allocno_mut(id).insn.as_mut() {
            ia.possible_alts = mask;
        }
    }
    combined.map_or(true, |c| !c.is_empty())
}

/// Tentatively set `a` to `(hard_regno, use_equiv_const_p)`, re-derive and
/// intersect the whole instruction's feasible-alternative sets, then
/// restore `a`'s prior state and every touched allocno's `possible_alts`.
/// A pure predicate: no observable side effect on failure or success.
pub fn check_hard_regno_memory_on_constraint(
    graph: &mut Graph,
    target: &dyn Target,
    a: AllocnoId,
    use_equiv_const_p: bool,
    hard_regno: Option<HardRegno>,
) -> bool {
    let saved_state = graph.allocno(a).state;
    let saved_use_equiv_const = graph.allocno(a).insn.as_ref().map(|ia| ia.use_equiv_const);

    graph.allocno_mut(a).state.hard_regno = hard_regno;
    if hard_regno.is_some() {
        graph.allocno_mut(a).state.mem_slot = None;
    }
    if let Some(ia) = graph.allocno_mut(a).insn.as_mut() {
        ia.use_equiv_const = use_equiv_const_p;
    }

    let insn_allocnos = graph.insn_allocnos_of(a);
    let saved_masks: Vec<_> = insn_allocnos
        .iter()
        .filter_map(|&id| graph.allocno(id).insn.as_ref().map(|ia| (id, ia.possible_alts)))
        .collect();

    let ok = recompute_possible_alts(graph, target, &insn_allocnos);

    graph.allocno_mut(a).state = saved_state;
    if let Some(equiv) = saved_use_equiv_const {
        if let Some(ia) = graph.allocno_mut(a).insn.as_mut() {
            ia.use_equiv_const = equiv;
        }
    }
    for (id, mask) in saved_masks {
        if let Some(ia) = graph.allocno_mut(id).insn.as_mut() {
            ia.possible_alts = mask;
        }
    }

    ok
}

/// Union, over every still-feasible alternative of `a`, of every register
/// class its constraint string names at that alternative.
pub fn possible_alt_reg_intersection(graph: &Graph, target: &dyn Target, a: AllocnoId) -> HardRegSet {
    let mut result = HardRegSet::empty();
    let ia = match graph.allocno(a).insn.as_ref() {
        Some(ia) => ia,
        None => return result,
    };
    let constraints = graph.operand_constraints(a);
    for (i, s) in constraints.iter().enumerate() {
        if !ia.possible_alts.get(i as u32) {
            continue;
        }
        for bucket in parse_constraint(s, target) {
            if let ConstraintKind::Class(c) = bucket {
                result.union_with(&target.class_contents(c));
            }
        }
    }
    result
}

/// Do every feasible alternative's integer-constraint letters admit
/// `offset`, for an operand in a `PLUS(base, const_int)` address context?
pub fn all_alt_offset_ok_p(graph: &Graph, target: &dyn Target, a: AllocnoId, offset: i64) -> bool {
    let ia = match graph.allocno(a).insn.as_ref() {
        Some(ia) => ia,
        None => return true,
    };
    let constraints = graph.operand_constraints(a);
    for (i, s) in constraints.iter().enumerate() {
        if !ia.possible_alts.get(i as u32) {
            continue;
        }
        for ch in s.chars() {
            if matches!(ch, 'I'..='P') && !target.integer_constraint_ok(ch, offset) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::graph::{GraphInputs, InsnId, InsnSpec, IoMode, OperandSpec, Wrapping};
    use crate::target::Mode;
    use crate::test_support::{StubTarget, GPR};

    fn one_reg_insn(constraint: &str) -> GraphInputs {
        GraphInputs {
            pseudos: vec![],
            insns: vec![InsnSpec {
                insn: InsnId::new(0),
                operands: vec![OperandSpec {
                    sub_class: OperandSubClass::Operand(0),
                    io_mode: IoMode::Out,
                    mode: Mode::new(4, 4),
                    regno: -1,
                    wrapping: Wrapping::None,
                    tied_to: None,
                    num_alts: 1,
                    point: 0,
                    constraints: vec![constraint.to_string()],
                }],
            }],
            copies: vec![],
        }
    }

    #[test]
    fn reg_class_feasible_when_assigned_in_class() {
        let target = StubTarget::default();
        let inputs = one_reg_insn("r");
        let mut graph = Graph::build(&inputs);
        let a = graph.allocno_ids().next().unwrap();
        assert!(check_hard_regno_memory_on_constraint(
            &mut graph,
            &target,
            a,
            false,
            Some(0)
        ));
        // Predicate restored state: still unassigned afterward.
        assert!(graph.allocno(a).state.is_unassigned());
    }

    #[test]
    fn unassigned_rejects_register_only_alt() {
        let target = StubTarget::default();
        let inputs = one_reg_insn("r");
        let mut graph = Graph::build(&inputs);
        let a = graph.allocno_ids().next().unwrap();
        // No alternative admits an unassigned operand, so leaving it
        // unassigned must fail the single "r" alternative.
        assert!(!check_hard_regno_memory_on_constraint(
            &mut graph, &target, a, false, None
        ));
    }

    #[test]
    fn possible_alt_reg_intersection_unions_classes() {
        let target = StubTarget::default();
        let inputs = one_reg_insn("r");
        let mut graph = Graph::build(&inputs);
        let a = graph.allocno_ids().next().unwrap();
        recompute_possible_alts(&mut graph, &target, &[a]);
        let regs = possible_alt_reg_intersection(&graph, &target, a);
        assert_eq!(regs, target.class_contents(GPR));
    }

    #[test]
    fn matched_digit_requires_equal_location() {
        let target = StubTarget::default();
        let inputs = GraphInputs {
            pseudos: vec![],
            insns: vec![InsnSpec {
                insn: InsnId::new(0),
                operands: vec![
                    OperandSpec {
                        sub_class: OperandSubClass::Operand(0),
                        io_mode: IoMode::Out,
                        mode: Mode::new(4, 4),
                        regno: -1,
                        wrapping: Wrapping::None,
                        tied_to: None,
                        num_alts: 1,
                        point: 0,
                        constraints: vec!["0".to_string()],
                    },
                    OperandSpec {
                        sub_class: OperandSubClass::Operand(1),
                        io_mode: IoMode::In,
                        mode: Mode::new(4, 4),
                        regno: -1,
                        wrapping: Wrapping::None,
                        tied_to: None,
                        num_alts: 1,
                        point: 0,
                        constraints: vec!["r".to_string()],
                    },
                ],
            }],
            copies: vec![],
        };
        let mut graph = Graph::build(&inputs);
        let ids: Vec<_> = graph.allocno_ids().collect();
        let (op0, op1) = (ids[0], ids[1]);
        graph.allocno_mut(op1).state.hard_regno = Some(3);
        assert!(check_hard_regno_memory_on_constraint(
            &mut graph,
            &target,
            op0,
            false,
            Some(3)
        ));
        assert!(!check_hard_regno_memory_on_constraint(
            &mut graph,
            &target,
            op0,
            false,
            Some(4)
        ));
    }
}
