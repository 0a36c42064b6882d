//! Transaction log (§4.10).
//!
//! A LIFO stack of frames over one flat log vector. `start` pushes a frame
//! recording the log's current length and the cost scalar at entry;
//! `commit` drops the frame (and, at the outermost level, the log entries
//! it covers); `undo` replays the frame's entries in reverse and restores
//! the cost scalar. Mirrors the scope-depth bookkeeping of a nested-scope
//! symbol table rather than a full persistent data structure: we don't need
//! to share structure across branches, only to roll back the single active
//! path.

use crate::graph::{AllocnoId, AllocnoState, CopyId, SecondaryChange};
use crate::memslot::MemSlotId;

/// One logged mutation, carrying enough of the pre-mutation state to
/// restore it exactly.
pub enum LogEntry {
    /// An allocno's `state` (hard reg / memory slot) plus its
    /// `use_equiv_const` flag, as they were before the mutation.
    Allocno {
        id: AllocnoId,
        state: AllocnoState,
        use_equiv_const: bool,
    },
    /// A copy's secondary-reload plan, as it was before the mutation.
    CopySecondary {
        id: CopyId,
        secondary: Option<SecondaryChange>,
    },
    /// A memory slot's `start` offset, as it was before the mutation.
    MemSlotStart { id: MemSlotId, start: Option<u32> },
}

struct Frame {
    base: usize,
    pre_cost: i64,
}

/// Owns the log vector and the frame stack.
#[derive(Default)]
pub struct TransactionLog {
    entries: Vec<LogEntry>,
    frames: Vec<Frame>,
}

impl TransactionLog {
    /// An empty log, no open transactions.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Number of currently nested transactions.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Is there at least one open transaction (so mutations should log)?
    pub fn is_open(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Push a new frame. Returns `true` if this is the outermost frame.
    pub fn start(&mut self, cost: i64) -> bool {
        let outermost = self.frames.is_empty();
        self.frames.push(Frame {
            base: self.entries.len(),
            pre_cost: cost,
        });
        outermost
    }

    /// Append a log entry, if a transaction is open.
    pub fn record(&mut self, entry: LogEntry) {
        if self.is_open() {
            self.entries.push(entry);
        }
    }

    /// Commit the innermost frame into its parent. Returns `true` if this
    /// was the outermost frame (so the caller should finalize deferred
    /// frees and any other end-of-pass bookkeeping).
    pub fn end(&mut self) -> bool {
        let frame = self.frames.pop().expect("end_transaction without start_transaction");
        let outermost = self.frames.is_empty();
        if outermost {
            self.entries.truncate(frame.base);
        }
        outermost
    }

    /// Pop the innermost frame and return its entries in reverse
    /// (replay/undo) order, along with the cost to restore. Returns
    /// whether this was the outermost frame.
    pub fn undo(&mut self) -> (Vec<LogEntry>, i64, bool) {
        let frame = self.frames.pop().expect("undo_transaction without start_transaction");
        let drained: Vec<LogEntry> = self.entries.drain(frame.base..).rev().collect();
        (drained, frame.pre_cost, self.frames.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn nested_start_end_merges_into_parent() {
        let mut log = TransactionLog::new();
        assert!(log.start(0));
        assert!(!log.start(0));
        log.record(LogEntry::Allocno {
            id: AllocnoId::new(0),
            state: Default::default(),
            use_equiv_const: false,
        });
        assert!(!log.end());
        assert_eq!(log.depth(), 1);
        assert!(log.end());
        assert_eq!(log.depth(), 0);
    }

    #[test]
    fn undo_drains_in_reverse_order() {
        let mut log = TransactionLog::new();
        log.start(5);
        log.record(LogEntry::MemSlotStart {
            id: MemSlotId::new(0),
            start: None,
        });
        log.record(LogEntry::MemSlotStart {
            id: MemSlotId::new(1),
            start: Some(4),
        });
        let (entries, pre_cost, outermost) = log.undo();
        assert!(outermost);
        assert_eq!(pre_cost, 5);
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], LogEntry::MemSlotStart { id, .. } if id == MemSlotId::new(1)));
    }
}
