//! The allocno/copy/CAN graph: the program model the rest of the allocator
//! operates on.
//!
//! Construction (§4.5) takes a flattened description of the program — the
//! `GraphInputs` the embedding compiler builds from its IR, instruction
//! selection, and per-point liveness — and produces the arenas and conflict
//! sets the allocation engine mutates. Instruction recognition, operand
//! decoding, and full dataflow liveness over a control-flow graph are all
//! external collaborators (§1); this module only does the data-independent
//! parts: allocating the arenas, wiring copy edges, intersecting supplied
//! live ranges into conflict vectors, and contracting copies into CANs.

mod allocno;
mod can;
mod copy;

pub use allocno::{
    Allocno, AllocnoId, AllocnoState, InsnAllocno, InsnId, IoMode, OperandSubClass, Wrapping,
};
pub use can::{Can, CanId};
pub use copy::{Copy, CopyId, SecondaryChange};

use crate::entity::{EntityRef, PrimaryMap, SecondaryMap};
use crate::target::Mode;
use std::collections::HashMap;
use std::collections::HashSet;

/// A linearized point in the program (e.g. one per instruction, or two per
/// instruction to distinguish before/after). Liveness is expressed as sets
/// of these; the core never interprets them beyond set membership.
pub type ProgramPoint = u32;

/// How a `CopySpec` endpoint identifies the allocno it refers to, before
/// the graph has been built and concrete `AllocnoId`s exist.
#[derive(Clone, Copy, Debug)]
pub enum AllocnoRef {
    /// The `n`th pseudo in `GraphInputs::pseudos`.
    Pseudo(usize),
    /// The `j`th operand of the `i`th instruction in `GraphInputs::insns`.
    InsnOperand(usize, usize),
}

/// One operand (or implicit register slot, or address sub-part) of an
/// instruction, as the IR visitor presents it.
pub struct OperandSpec {
    /// Which part of the instruction this is.
    pub sub_class: OperandSubClass,
    /// Read/write direction.
    pub io_mode: IoMode,
    /// Mode of the value at this operand.
    pub mode: Mode,
    /// The pseudo or hard register this operand names, if any (`< 0` if
    /// this is a fresh anonymous temporary, e.g. a scratch).
    pub regno: i32,
    /// Subreg wrapping, if any.
    pub wrapping: Wrapping,
    /// Index, within the same instruction's operand list, of the operand
    /// this one is tied to via a matching constraint digit.
    pub tied_to: Option<usize>,
    /// Number of alternatives in the instruction's alternatives table.
    pub num_alts: u32,
    /// Program point at which this operand's value is live (its use or
    /// def point).
    pub point: ProgramPoint,
    /// This operand's constraint string, one entry per alternative.
    pub constraints: Vec<String>,
}

/// One instruction, as the IR visitor presents it.
pub struct InsnSpec {
    /// Opaque instruction identity.
    pub insn: InsnId,
    /// This instruction's operands (including matched, implicit, and
    /// address sub-part allocnos).
    pub operands: Vec<OperandSpec>,
}

/// One source-IR pseudo register.
pub struct PseudoSpec {
    /// The pseudo's register number (`>= 0`).
    pub regno: i32,
    /// The pseudo's mode.
    pub mode: Mode,
    /// Program points at which this pseudo is live.
    pub live_points: Vec<ProgramPoint>,
    /// Is this pseudo live across a call?
    pub call_crossing: bool,
}

/// A def-use or use-def boundary that crosses a copy-like instruction or a
/// matched-operand tie, to be wired as a `Copy` edge.
pub struct CopySpec {
    /// Source endpoint, or `None` for a literal source.
    pub src: Option<AllocnoRef>,
    /// Destination endpoint, or `None` for a discarded result.
    pub dst: Option<AllocnoRef>,
    /// Execution frequency of the source basic block.
    pub freq: u32,
    /// Mode of the move.
    pub mode: Mode,
}

/// Flattened program description consumed by `build_graph`.
#[derive(Default)]
pub struct GraphInputs {
    /// One entry per source-IR pseudo.
    pub pseudos: Vec<PseudoSpec>,
    /// One entry per instruction.
    pub insns: Vec<InsnSpec>,
    /// Copy edges to wire between the allocnos created from `pseudos` and
    /// `insns`.
    pub copies: Vec<CopySpec>,
}

/// The allocno/copy/CAN graph.
pub struct Graph {
    pub(crate) allocnos: PrimaryMap<AllocnoId, Allocno>,
    pub(crate) copies: PrimaryMap<CopyId, Copy>,
    pub(crate) cans: PrimaryMap<CanId, Can>,
    operand_constraints: SecondaryMap<AllocnoId, Vec<String>>,
}

impl Graph {
    /// Build the graph from a flattened program description (§4.5, steps
    /// 1-6).
    pub fn build(inputs: &GraphInputs) -> Self {
        let mut allocnos: PrimaryMap<AllocnoId, Allocno> = PrimaryMap::new();
        let mut operand_constraints: SecondaryMap<AllocnoId, Vec<String>> = SecondaryMap::new();

        // Step 1: one allocno per pseudo.
        let mut pseudo_ids = Vec::with_capacity(inputs.pseudos.len());
        let mut live_ranges: Vec<HashSet<ProgramPoint>> = Vec::new();
        for p in &inputs.pseudos {
            let mut a = Allocno::new_pseudo(p.regno, p.mode);
            a.call_crossing = p.call_crossing;
            let id = allocnos.push(a);
            pseudo_ids.push(id);
            live_ranges.push(p.live_points.iter().copied().collect());
        }

        // Step 2: one allocno per operand/implicit-reg/address-sub-part.
        let mut insn_operand_ids: Vec<Vec<AllocnoId>> = Vec::with_capacity(inputs.insns.len());
        for insn in &inputs.insns {
            let mut ids = Vec::with_capacity(insn.operands.len());
            for op in &insn.operands {
                let mut ia = InsnAllocno::new(insn.insn, op.sub_class, op.io_mode, op.num_alts);
                ia.wrapping = op.wrapping;
                let a = Allocno::new_insn(op.mode, op.regno, ia);
                let id = allocnos.push(a);
                *operand_constraints.get_mut(id) = op.constraints.clone();
                ids.push(id);
                let mut s = HashSet::new();
                s.insert(op.point);
                if op.io_mode == IoMode::InOut {
                    s.insert(op.point + 1);
                }
                live_ranges.push(s);
            }
            insn_operand_ids.push(ids);
        }

        // Wire tied-operand pointers now that every insn allocno exists.
        for (i, insn) in inputs.insns.iter().enumerate() {
            for (j, op) in insn.operands.iter().enumerate() {
                if let Some(t) = op.tied_to {
                    let this_id = insn_operand_ids[i][j];
                    let other_id = insn_operand_ids[i][t];
                    let original_p = matches!(op.io_mode, IoMode::Out | IoMode::InOut);
                    if let Some(ia) = allocnos[this_id].insn.as_mut() {
                        ia.tied_allocno = Some(other_id);
                        ia.original_p = original_p;
                    }
                }
            }
        }

        let resolve = |r: AllocnoRef| -> AllocnoId {
            match r {
                AllocnoRef::Pseudo(i) => pseudo_ids[i],
                AllocnoRef::InsnOperand(i, j) => insn_operand_ids[i][j],
            }
        };

        // Step 3: copy edges.
        let mut copies: PrimaryMap<CopyId, Copy> = PrimaryMap::new();
        for cs in &inputs.copies {
            let src = cs.src.map(resolve);
            let dst = cs.dst.map(resolve);
            copies.push(Copy::new(src, dst, cs.freq, cs.mode));
        }

        // Step 4: liveness -> conflicts. Two allocnos conflict if their
        // live-point sets overlap and they aren't the very same allocno.
        let n = allocnos.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if !live_ranges[i].is_disjoint(&live_ranges[j]) {
                    let (ai, aj) = (AllocnoId::new(i), AllocnoId::new(j));
                    allocnos[ai].conflicts.push(aj);
                    allocnos[aj].conflicts.push(ai);
                }
            }
        }
        // copy_conflict_vec: a copy conflicts with an allocno's secondary
        // resources whenever that allocno is simultaneously live with
        // either endpoint of the copy.
        for (cp_id, cp) in copies.iter() {
            for &end in &[cp.src, cp.dst] {
                if let Some(end) = end {
                    for other in allocnos[end].conflicts.clone() {
                        if !allocnos[other].copy_conflicts.contains(&cp_id) {
                            allocnos[other].copy_conflicts.push(cp_id);
                        }
                    }
                }
            }
        }

        // Step 5: contract copies sharing a pseudo and not conflicting, via
        // union-find over allocno indices.
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], x: usize) -> usize {
            if parent[x] != x {
                parent[x] = find(parent, parent[x]);
            }
            parent[x]
        }
        for cp in copies.iter().map(|(_, cp)| cp) {
            if let (Some(src), Some(dst)) = (cp.src, cp.dst) {
                let (si, di) = (src.index(), dst.index());
                let same_pseudo = allocnos[src].regno >= 0 && allocnos[src].regno == allocnos[dst].regno;
                let conflicting = allocnos[src].conflicts.contains(&dst);
                if same_pseudo && !conflicting {
                    let (ri, rj) = (find(&mut parent, si), find(&mut parent, di));
                    if ri != rj {
                        parent[rj] = ri;
                    }
                }
            }
        }
        let mut root_to_can: HashMap<usize, CanId> = HashMap::new();
        let mut cans: PrimaryMap<CanId, Can> = PrimaryMap::new();
        for i in 0..n {
            let root = find(&mut parent, i);
            let id = AllocnoId::new(i);
            let mode = allocnos[id].mode;
            match root_to_can.get(&root) {
                Some(&can_id) => cans[can_id].absorb(id, mode),
                None => {
                    let can_id = cans.push(Can::singleton(id, mode));
                    root_to_can.insert(root, can_id);
                }
            }
            allocnos[id].can = Some(*root_to_can.get(&root).unwrap());
        }

        // Step 6: CAN-CAN conflicts, derived from member conflicts.
        let mut can_conflicts: Vec<HashSet<CanId>> = vec![HashSet::new(); cans.len()];
        for (id, a) in allocnos.iter() {
            let my_can = a.can.unwrap();
            for &other in &a.conflicts {
                let other_can = allocnos[other].can.unwrap();
                if other_can != my_can {
                    can_conflicts[my_can.index()].insert(other_can);
                }
            }
            let _ = id;
        }
        for (can_id, can) in cans.iter_mut() {
            can.conflicts = can_conflicts[can_id.index()].iter().copied().collect();
        }

        Self {
            allocnos,
            copies,
            cans,
            operand_constraints,
        }
    }

    /// This operand-allocno's constraint string for each alternative, in
    /// alternative order. Empty for a `PSEUDO_REG` allocno.
    pub fn operand_constraints(&self, a: AllocnoId) -> &[String] {
        &self.operand_constraints[a]
    }

    /// Every `INSN_ALLOCNO` belonging to the same instruction as `a`
    /// (including `a` itself), for the cross-operand intersection step of
    /// constraint evaluation.
    pub fn insn_allocnos_of(&self, a: AllocnoId) -> Vec<AllocnoId> {
        let insn = match self.allocnos[a].insn.as_ref() {
            Some(ia) => ia.insn,
            None => return Vec::new(),
        };
        self.allocnos
            .iter()
            .filter(|(_, other)| other.insn.as_ref().map(|i| i.insn) == Some(insn))
            .map(|(id, _)| id)
            .collect()
    }

    /// Access an allocno.
    pub fn allocno(&self, id: AllocnoId) -> &Allocno {
        &self.allocnos[id]
    }

    /// Mutably access an allocno.
    pub fn allocno_mut(&mut self, id: AllocnoId) -> &mut Allocno {
        &mut self.allocnos[id]
    }

    /// Access a copy.
    pub fn copy(&self, id: CopyId) -> &Copy {
        &self.copies[id]
    }

    /// Mutably access a copy.
    pub fn copy_mut(&mut self, id: CopyId) -> &mut Copy {
        &mut self.copies[id]
    }

    /// Access a CAN.
    pub fn can(&self, id: CanId) -> &Can {
        &self.cans[id]
    }

    /// Mutably access a CAN.
    pub fn can_mut(&mut self, id: CanId) -> &mut Can {
        &mut self.cans[id]
    }

    /// Iterate over every allocno id.
    pub fn allocno_ids(&self) -> impl Iterator<Item = AllocnoId> + '_ {
        self.allocnos.keys()
    }

    /// Iterate over every copy id.
    pub fn copy_ids(&self) -> impl Iterator<Item = CopyId> + '_ {
        self.copies.keys()
    }

    /// The allocno's own mode (never reinterpreted through a subreg).
    pub fn allocno_mode(&self, a: AllocnoId) -> Mode {
        self.allocnos[a].allocno_mode()
    }

    /// The mode of the allocno's container (the outer mode of a subreg, if
    /// any).
    pub fn allocation_mode(&self, a: AllocnoId) -> Mode {
        self.allocnos[a].allocation_mode()
    }

    /// Translate "the hard reg covering the whole container" into "the hard
    /// reg occupying just `a`'s location", assuming uniform 4-byte register
    /// units (the simplification the target facade's subreg arithmetic
    /// relies on; see `DESIGN.md`).
    pub fn get_allocno_hard_regno(&self, a: AllocnoId, container_hard_regno: u32) -> u32 {
        match self.allocnos[a].insn.as_ref().map(|i| i.wrapping) {
            Some(Wrapping::Subreg { byte, .. }) => container_hard_regno + byte / 4,
            _ => container_hard_regno,
        }
    }

    /// Inverse of `get_allocno_hard_regno`.
    pub fn get_allocno_reg_hard_regno(&self, a: AllocnoId, allocno_hard_regno: u32) -> u32 {
        match self.allocnos[a].insn.as_ref().map(|i| i.wrapping) {
            Some(Wrapping::Subreg { byte, .. }) => allocno_hard_regno.saturating_sub(byte / 4),
            _ => allocno_hard_regno,
        }
    }

    /// For an allocno nested in a larger container, the first hard reg of
    /// the container's occupation.
    pub fn get_maximal_part_start_hard_regno(&self, hard_regno: u32, a: AllocnoId) -> u32 {
        self.get_allocno_reg_hard_regno(a, hard_regno)
    }

    /// Choose the wider of a copy's two endpoint modes, subject to
    /// `HARD_REGNO_MODE_OK`; falls back to the inner subreg mode, then to
    /// the plain allocno mode when neither side is a subreg.
    pub fn get_copy_mode(&self, cp: CopyId, target: &dyn crate::target::Target) -> Mode {
        let cp = &self.copies[cp];
        let mut mode = cp.mode;
        for &end in &[cp.src, cp.dst] {
            if let Some(a) = end {
                let am = self.allocation_mode(a);
                if am.size > mode.size && target.hard_regno_mode_ok(0, am) {
                    mode = am;
                }
            }
        }
        mode
    }

    /// Resolve one side of a copy to its concrete machine location.
    pub fn get_copy_loc(&self, cp: CopyId, src_side: bool) -> CopyLoc {
        let cp = &self.copies[cp];
        let end = if src_side { cp.src } else { cp.dst };
        match end {
            None => CopyLoc::None,
            Some(a) => {
                let alloc = &self.allocnos[a];
                let offset = match alloc.insn.as_ref().map(|i| i.wrapping) {
                    Some(Wrapping::Subreg { byte, .. }) => byte,
                    _ => 0,
                };
                match alloc.state.hard_regno {
                    Some(hr) => CopyLoc::Reg {
                        mode: alloc.allocno_mode(),
                        hard_regno: self.get_allocno_hard_regno(a, hr),
                    },
                    None => match alloc.state.mem_slot {
                        Some((slot, base_offset)) => CopyLoc::Memory {
                            mode: alloc.allocno_mode(),
                            slot,
                            offset: base_offset + offset,
                        },
                        None => CopyLoc::Unassigned,
                    },
                }
            }
        }
    }
}

/// The concrete machine location one side of a copy resolves to.
#[derive(Clone, Copy, Debug)]
pub enum CopyLoc {
    /// The copy endpoint is a literal / sink; there is no location.
    None,
    /// Not yet assigned.
    Unassigned,
    /// A hard register.
    Reg { mode: Mode, hard_regno: u32 },
    /// A memory slot and byte offset within it.
    Memory {
        mode: Mode,
        slot: crate::memslot::MemSlotId,
        offset: u32,
    },
}
