//! Per-block aggregation and scheduling state

use crate::types::{BlockNumber, CellId, ChainId};
use crate::vector_clock::VectorClock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Lifecycle of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Collecting decisions (or a placeholder created by a dependent)
    Pending,
    /// Final clock known, waiting on unscheduled predecessors
    Waiting,
    /// In the commit buffer
    Scheduled,
    /// Delivered to the commit sink
    Committed,
}

/// One block of one sub-chain, owned by the store
#[derive(Debug, Clone)]
pub struct Cell {
    id: CellId,
    pub(crate) decisions: Vec<VectorClock>,
    pub(crate) final_decision: Option<VectorClock>,
    /// Unscheduled predecessors this cell waits on
    pub(crate) depends_count: u32,
    /// Cells waiting on this one
    pub(crate) depended: BTreeSet<CellId>,
    /// Longest reference path below this cell, set when it is scheduled
    pub(crate) depth: Option<u64>,
    pub(crate) scheduled: bool,
    pub(crate) committed: bool,
}

impl Cell {
    pub(crate) fn new(id: CellId, participants: usize) -> Self {
        Self {
            id,
            decisions: Vec::with_capacity(participants),
            final_decision: None,
            depends_count: 0,
            depended: BTreeSet::new(),
            depth: None,
            scheduled: false,
            committed: false,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn decisions(&self) -> &[VectorClock] {
        &self.decisions
    }

    pub fn final_decision(&self) -> Option<&VectorClock> {
        self.final_decision.as_ref()
    }

    pub fn depends_count(&self) -> u32 {
        self.depends_count
    }

    pub fn depended(&self) -> impl Iterator<Item = CellId> + '_ {
        self.depended.iter().copied()
    }

    pub fn depth(&self) -> Option<u64> {
        self.depth
    }

    pub fn is_merged(&self) -> bool {
        self.final_decision.is_some()
    }

    /// In the commit buffer or already committed
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Final clock known and every referenced cell scheduled
    pub fn ready_to_schedule(&self) -> bool {
        self.is_merged() && self.depends_count == 0 && !self.scheduled
    }

    pub fn state(&self) -> CellState {
        if self.committed {
            CellState::Committed
        } else if self.scheduled {
            CellState::Scheduled
        } else if self.is_merged() {
            CellState::Waiting
        } else {
            CellState::Pending
        }
    }
}

/// A cell as handed to the commit sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedCell {
    pub id: CellId,
    pub final_decision: VectorClock,
}

impl CommittedCell {
    pub fn chain_id(&self) -> ChainId {
        self.id.chain_id
    }

    pub fn block_number(&self) -> BlockNumber {
        self.id.block_number
    }

    /// Happens-before on the final clocks; concurrent cells fall back to
    /// lower chain id, then lower block number.
    pub fn precedes(&self, other: &CommittedCell) -> bool {
        match self.final_decision.causal_cmp(&other.final_decision) {
            Some(Ordering::Less) => true,
            Some(Ordering::Greater) => false,
            _ => self.id < other.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(chain: ChainId, block: BlockNumber, clock: &[(ChainId, BlockNumber)]) -> CommittedCell {
        CommittedCell {
            id: CellId::new(chain, block),
            final_decision: clock.iter().copied().collect(),
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut cell = Cell::new(CellId::new(0, 0), 2);
        assert_eq!(cell.state(), CellState::Pending);
        assert!(!cell.ready_to_schedule());

        cell.final_decision = Some(VectorClock::from_participants([0, 1]));
        cell.depends_count = 1;
        assert_eq!(cell.state(), CellState::Waiting);
        assert!(!cell.ready_to_schedule());

        cell.depends_count = 0;
        assert!(cell.ready_to_schedule());
        cell.scheduled = true;
        assert!(!cell.ready_to_schedule());
        assert_eq!(cell.state(), CellState::Scheduled);
        cell.committed = true;
        assert_eq!(cell.state(), CellState::Committed);
    }

    #[test]
    fn test_precedes_causal_then_tie_break() {
        let a = committed(1, 0, &[(0, 0), (1, -1)]);
        let b = committed(0, 2, &[(0, 1), (1, -1)]);
        // causal order wins over chain id
        assert!(a.precedes(&b));
        assert!(!b.precedes(&a));

        let c = committed(1, 0, &[(0, -1), (1, -1)]);
        let d = committed(0, 0, &[(0, -1), (1, -1)]);
        assert!(d.precedes(&c));

        let e = committed(0, 3, &[(0, 2), (1, -1)]);
        let f = committed(1, 1, &[(0, -1), (1, 0)]);
        assert!(e.precedes(&f));
    }
}
