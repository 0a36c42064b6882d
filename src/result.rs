//! Input validation for `build_graph` (§4.5's "flattened description the
//! embedding compiler builds").
//!
//! This is distinct from both of §7's error modes. It isn't a recoverable
//! allocation decision (there is no candidate to try next), and it isn't a
//! core invariant violation (the core hasn't touched anything yet) — it is
//! a malformed-input report for the embedder that handed us a `GraphInputs`
//! with a dangling index. Left unchecked, these would surface as an index
//! panic deep inside `Graph::build` instead of at the boundary, so they get
//! a real `Fail` type rather than `unreachable!`.

use crate::graph::{AllocnoRef, GraphInputs};
use failure_derive::Fail;

/// A structural problem in a `GraphInputs` value, caught before `build_graph`
/// ever touches `Graph::build`.
#[derive(Debug, Fail)]
pub enum BuildError {
    /// A `CopySpec` endpoint named a pseudo index past the end of
    /// `GraphInputs::pseudos`.
    #[fail(
        display = "copy {} references pseudo {}, but only {} pseudos were supplied",
        copy_index, pseudo_index, pseudo_count
    )]
    PseudoIndexOutOfRange {
        copy_index: usize,
        pseudo_index: usize,
        pseudo_count: usize,
    },
    /// A `CopySpec` endpoint named an instruction index past the end of
    /// `GraphInputs::insns`.
    #[fail(
        display = "copy {} references insn {}, but only {} insns were supplied",
        copy_index, insn_index, insn_count
    )]
    InsnIndexOutOfRange {
        copy_index: usize,
        insn_index: usize,
        insn_count: usize,
    },
    /// A `CopySpec` endpoint named an operand index past the end of that
    /// instruction's operand list.
    #[fail(
        display = "copy {} references insn {} operand {}, but it only has {} operands",
        copy_index, insn_index, operand_index, operand_count
    )]
    OperandIndexOutOfRange {
        copy_index: usize,
        insn_index: usize,
        operand_index: usize,
        operand_count: usize,
    },
    /// An operand's `tied_to` named another operand past the end of the
    /// same instruction's operand list.
    #[fail(
        display = "insn {} operand {} is tied to operand {}, but the insn only has {} operands",
        insn_index, operand_index, tied_to, operand_count
    )]
    TiedOperandOutOfRange {
        insn_index: usize,
        operand_index: usize,
        tied_to: usize,
        operand_count: usize,
    },
    /// An operand's `constraints` didn't carry one entry per alternative.
    #[fail(
        display = "insn {} operand {} declares {} alternatives but supplies {} constraint strings",
        insn_index, operand_index, num_alts, constraint_count
    )]
    ConstraintAltCountMismatch {
        insn_index: usize,
        operand_index: usize,
        num_alts: u32,
        constraint_count: usize,
    },
}

/// Check a `GraphInputs` for dangling indices and alternative-count
/// mismatches before handing it to `Graph::build`.
pub fn validate_inputs(inputs: &GraphInputs) -> Result<(), BuildError> {
    for (insn_index, insn) in inputs.insns.iter().enumerate() {
        for (operand_index, op) in insn.operands.iter().enumerate() {
            if op.constraints.len() != op.num_alts as usize {
                return Err(BuildError::ConstraintAltCountMismatch {
                    insn_index,
                    operand_index,
                    num_alts: op.num_alts,
                    constraint_count: op.constraints.len(),
                });
            }
            if let Some(tied_to) = op.tied_to {
                if tied_to >= insn.operands.len() {
                    return Err(BuildError::TiedOperandOutOfRange {
                        insn_index,
                        operand_index,
                        tied_to,
                        operand_count: insn.operands.len(),
                    });
                }
            }
        }
    }

    for (copy_index, cp) in inputs.copies.iter().enumerate() {
        for end in [cp.src, cp.dst].iter().flatten() {
            validate_ref(inputs, copy_index, *end)?;
        }
    }

    Ok(())
}

fn validate_ref(inputs: &GraphInputs, copy_index: usize, r: AllocnoRef) -> Result<(), BuildError> {
    match r {
        AllocnoRef::Pseudo(i) => {
            if i >= inputs.pseudos.len() {
                return Err(BuildError::PseudoIndexOutOfRange {
                    copy_index,
                    pseudo_index: i,
                    pseudo_count: inputs.pseudos.len(),
                });
            }
        }
        AllocnoRef::InsnOperand(insn_index, operand_index) => {
            let insn = inputs.insns.get(insn_index).ok_or(BuildError::InsnIndexOutOfRange {
                copy_index,
                insn_index,
                insn_count: inputs.insns.len(),
            })?;
            if operand_index >= insn.operands.len() {
                return Err(BuildError::OperandIndexOutOfRange {
                    copy_index,
                    insn_index,
                    operand_index,
                    operand_count: insn.operands.len(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CopySpec, InsnId, InsnSpec, IoMode, OperandSubClass, OperandSpec, PseudoSpec, Wrapping};
    use crate::target::Mode;

    fn one_operand_insn() -> InsnSpec {
        InsnSpec {
            insn: InsnId::new(0),
            operands: vec![OperandSpec {
                sub_class: OperandSubClass::Operand(0),
                io_mode: IoMode::In,
                mode: Mode::new(4, 4),
                regno: 0,
                wrapping: Wrapping::None,
                tied_to: None,
                num_alts: 1,
                point: 0,
                constraints: vec!["r".to_string()],
            }],
        }
    }

    #[test]
    fn well_formed_inputs_pass() {
        let inputs = GraphInputs {
            pseudos: vec![PseudoSpec {
                regno: 0,
                mode: Mode::new(4, 4),
                live_points: vec![0],
                call_crossing: false,
            }],
            insns: vec![one_operand_insn()],
            copies: vec![CopySpec {
                src: Some(AllocnoRef::Pseudo(0)),
                dst: Some(AllocnoRef::InsnOperand(0, 0)),
                freq: 1,
                mode: Mode::new(4, 4),
            }],
        };
        assert!(validate_inputs(&inputs).is_ok());
    }

    #[test]
    fn dangling_pseudo_index_is_rejected() {
        let inputs = GraphInputs {
            pseudos: vec![],
            insns: vec![],
            copies: vec![CopySpec {
                src: Some(AllocnoRef::Pseudo(3)),
                dst: None,
                freq: 1,
                mode: Mode::new(4, 4),
            }],
        };
        assert!(matches!(
            validate_inputs(&inputs),
            Err(BuildError::PseudoIndexOutOfRange { pseudo_index: 3, pseudo_count: 0, .. })
        ));
    }

    #[test]
    fn dangling_operand_index_is_rejected() {
        let inputs = GraphInputs {
            pseudos: vec![],
            insns: vec![one_operand_insn()],
            copies: vec![CopySpec {
                src: Some(AllocnoRef::InsnOperand(0, 5)),
                dst: None,
                freq: 1,
                mode: Mode::new(4, 4),
            }],
        };
        assert!(matches!(
            validate_inputs(&inputs),
            Err(BuildError::OperandIndexOutOfRange { operand_index: 5, operand_count: 1, .. })
        ));
    }

    #[test]
    fn tied_to_out_of_range_is_rejected() {
        let mut insn = one_operand_insn();
        insn.operands[0].tied_to = Some(9);
        let inputs = GraphInputs {
            pseudos: vec![],
            insns: vec![insn],
            copies: vec![],
        };
        assert!(matches!(
            validate_inputs(&inputs),
            Err(BuildError::TiedOperandOutOfRange { tied_to: 9, operand_count: 1, .. })
        ));
    }

    #[test]
    fn constraint_count_mismatch_is_rejected() {
        let mut insn = one_operand_insn();
        insn.operands[0].num_alts = 2;
        let inputs = GraphInputs {
            pseudos: vec![],
            insns: vec![insn],
            copies: vec![],
        };
        assert!(matches!(
            validate_inputs(&inputs),
            Err(BuildError::ConstraintAltCountMismatch { num_alts: 2, constraint_count: 1, .. })
        ));
    }
}
