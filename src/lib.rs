//! Graph-based global register allocator core.
//!
//! This crate is the allocation *core* only: given a flattened description
//! of a program's pseudo registers, instruction operands, and copy edges
//! (`GraphInputs`), plus a `Target` describing the machine's register
//! classes and costs, it builds the allocno/copy/CAN conflict graph and
//! exposes the primitives (`Pass`) an external heuristic drives to assign
//! hard registers and stack slots. Instruction recognition, full dataflow
//! liveness, and the heuristic search order itself are all the embedder's
//! job; see the module docs on `graph` and `engine` for the exact split.

extern crate failure_derive;

mod constraints;
mod eliminate;
mod engine;
mod entity;
mod graph;
mod hardreg;
mod memslot;
mod regset;
mod result;
mod secondary;
mod stack_packer;
mod target;
mod transaction;

#[cfg(test)]
mod test_support;

pub use crate::eliminate::{AddressDecode, EliminationCandidate, EliminationTable};
pub use crate::engine::{AssignKind, EquivalenceOracle, NoEquivalences, Pass};
pub use crate::entity::{AltMask, EntityRef};
pub use crate::graph::{
    Allocno, AllocnoId, AllocnoRef, AllocnoState, Can, CanId, Copy, CopyId, CopyLoc, CopySpec,
    Graph, GraphInputs, InsnAllocno, InsnId, InsnSpec, IoMode, OperandSpec, OperandSubClass,
    PseudoSpec, Wrapping,
};
pub use crate::memslot::MemSlotId;
pub use crate::regset::HardRegSet;
pub use crate::result::BuildError;
pub use crate::target::{HardRegno, Mode, RegClassId, ReloadIcode, Target};
