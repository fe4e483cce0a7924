//! Commit buffer: releases ready cells in the global order
//!
//! Ready cells are keyed by `(depth, weight, chain, block)`. `depth` is the
//! longest reference path below the cell, so a cell always sorts after every
//! cell its final clock names; with admission gated on those cells being
//! scheduled, the buffer head can always commit. `weight` is the sum of the
//! final clock and orders causally related cells of equal depth. Concurrent
//! cells fall back to the chain/block tie-break.

use crate::cell::CommittedCell;
use crate::error::InvariantViolation;
use crate::store::VectorClockStore;
use crate::types::{CellId, NO_BLOCK};
use crate::vector_clock::VectorClock;
use std::collections::BTreeSet;

/// Position of a ready cell in the global order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommitKey {
    depth: u64,
    weight: i64,
    id: CellId,
}

impl CommitKey {
    pub fn new(id: CellId, depth: u64, final_decision: &VectorClock) -> Self {
        Self {
            depth,
            weight: final_decision.weight(),
            id,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }
}

/// Min-ordered buffer of ready cells
#[derive(Debug, Default)]
pub struct CommitScheduler {
    buffer: BTreeSet<CommitKey>,
}

impl CommitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn peek(&self) -> Option<CellId> {
        self.buffer.first().map(|k| k.id)
    }

    /// Move a ready cell into the buffer. Every cell its final clock names
    /// must already be scheduled, committed or pruned.
    pub(crate) fn schedule(&mut self, store: &mut VectorClockStore, id: CellId) -> Result<(), InvariantViolation> {
        let clock = match store.cell(id) {
            Some(cell) if cell.scheduled => return Err(InvariantViolation::new(id, "cell scheduled twice")),
            Some(cell) if cell.depends_count == 0 => cell
                .final_decision
                .clone()
                .ok_or_else(|| InvariantViolation::new(id, "scheduling a cell without a final clock"))?,
            Some(_) => return Err(InvariantViolation::new(id, "scheduling a cell that is not ready")),
            None => return Err(InvariantViolation::new(id, "scheduling a missing cell")),
        };

        let mut depth = 0;
        for (chain_id, upto) in clock.iter().filter(|(_, upto)| *upto != NO_BLOCK) {
            let reference = CellId::new(chain_id, upto);
            let below = store
                .reference_depth(reference)
                .ok_or_else(|| InvariantViolation::new(id, format!("referenced cell {} is not scheduled", reference)))?;
            depth = depth.max(below + 1);
        }

        let cell = store
            .cell_mut(id)
            .ok_or_else(|| InvariantViolation::new(id, "scheduling a missing cell"))?;
        cell.depth = Some(depth);
        cell.scheduled = true;
        self.buffer.insert(CommitKey::new(id, depth, &clock));
        tracing::trace!("Cell {} scheduled at depth {}, buffer holds {}", id, depth, self.buffer.len());
        Ok(())
    }

    /// Commit from the front of the buffer until the front cell names a block
    /// that has not been committed yet. Returns the cells committed, in order.
    pub(crate) fn drain(&mut self, store: &mut VectorClockStore) -> Result<Vec<CommittedCell>, InvariantViolation> {
        let mut committed = Vec::new();

        while let Some(key) = self.buffer.first().copied() {
            let id = key.id;
            let clock = store
                .cell(id)
                .and_then(|c| c.final_decision.clone())
                .ok_or_else(|| InvariantViolation::new(id, "scheduled cell has no final clock"))?;

            let blocked = clock
                .iter()
                .find(|(chain, upto)| store.last_finished(*chain).map_or(true, |done| done < *upto));
            if let Some((chain, upto)) = blocked {
                tracing::trace!("Cell {} waits for chain {} to reach {}", id, chain, upto);
                break;
            }

            self.buffer.pop_first();
            store.advance(id)?;
            tracing::debug!("Committed cell {} with clock {}", id, clock);
            committed.push(CommittedCell {
                id,
                final_decision: clock,
            });
        }

        Ok(committed)
    }
}
