//! Cross-chain order manager
//!
//! Collects one decision per participating chain for every block, merges
//! them into a final vector clock and releases blocks to the commit sink in a
//! single deterministic order. The whole pipeline runs synchronously inside
//! `push_decision` under one lock.

use crate::cell::CommittedCell;
use crate::config::OrderConfig;
use crate::error::{InputError, InvariantViolation};
use crate::resolver::{register_dependencies, release_dependents};
use crate::scheduler::CommitScheduler;
use crate::sink::CommitSink;
use crate::store::VectorClockStore;
use crate::types::{BlockNumber, CellId, ChainId, DecisionOutcome, OrderStats, NO_BLOCK};
use crate::vector_clock::VectorClock;
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Merges per-chain decisions into one global commit order
pub struct OrderManager {
    state: Mutex<ManagerState>,
}

struct ManagerState {
    store: VectorClockStore,
    scheduler: CommitScheduler,
    sink: Box<dyn CommitSink>,
    retention_window: Option<u64>,
    stats: OrderStats,
    halted: bool,
}

impl OrderManager {
    /// Create a manager delivering into `sink`.
    ///
    /// If `config.participants` is empty the manager stays unconfigured until
    /// [`set_sub_chain_ids`](Self::set_sub_chain_ids) is called.
    pub fn new(config: &OrderConfig, sink: impl CommitSink + 'static) -> Self {
        let manager = Self {
            state: Mutex::new(ManagerState {
                store: VectorClockStore::default(),
                scheduler: CommitScheduler::new(),
                sink: Box::new(sink),
                retention_window: config.retention_window,
                stats: OrderStats::default(),
                halted: false,
            }),
        };
        if !config.participants.is_empty() {
            manager.state.lock().configure(config.participants.iter().copied());
        }
        manager
    }

    /// Fix the participating chains. Allowed exactly once.
    pub fn set_sub_chain_ids<I: IntoIterator<Item = ChainId>>(&self, ids: I) -> Result<(), InputError> {
        let mut state = self.state.lock();
        state.ensure_running();
        if state.store.participant_count() > 0 {
            return Err(InputError::AlreadyConfigured);
        }
        let ids: BTreeSet<ChainId> = ids.into_iter().collect();
        if ids.is_empty() {
            return Err(InputError::EmptyParticipants);
        }
        state.configure(ids);
        Ok(())
    }

    /// Accept one chain's decision for block `block_number` of `chain_id`.
    ///
    /// Once all N decisions for the cell are in, the cell is merged and every
    /// block that becomes safe is delivered to the sink before this returns.
    pub fn push_decision(
        &self,
        chain_id: ChainId,
        block_number: BlockNumber,
        decision: VectorClock,
    ) -> Result<DecisionOutcome, InputError> {
        let id = CellId::new(chain_id, block_number);
        let mut state = self.state.lock();
        state.ensure_running();
        tracing::trace!("Decision for {}: {}", id, decision);

        match state.accept(id, decision) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                state.stats.decisions_rejected += 1;
                tracing::warn!("Rejected decision for {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Last committed block of a chain
    pub fn last_finished(&self, chain_id: ChainId) -> Option<BlockNumber> {
        self.state.lock().store.last_finished(chain_id)
    }

    pub fn participant_count(&self) -> usize {
        self.state.lock().store.participant_count()
    }

    /// Get current stats
    pub fn stats(&self) -> OrderStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.participants = state.store.participant_count();
        stats.live_cells = state.store.live_cells();
        stats.scheduled_cells = state.scheduler.len();
        stats
    }
}

impl ManagerState {
    fn configure<I: IntoIterator<Item = ChainId>>(&mut self, ids: I) {
        self.store = VectorClockStore::new(ids);
        tracing::info!(
            "Order manager tracking {} sub-chains: {:?}",
            self.store.participant_count(),
            self.store.participants().collect::<Vec<_>>()
        );
    }

    fn ensure_running(&self) {
        if self.halted {
            panic!("order manager halted after an invariant violation");
        }
    }

    fn halt(&mut self, violation: InvariantViolation) -> ! {
        self.halted = true;
        tracing::error!("Order manager invariant violated, halting: {}", violation);
        panic!("{}", violation);
    }

    fn accept(&mut self, id: CellId, decision: VectorClock) -> Result<DecisionOutcome, InputError> {
        self.validate(id, &decision)?;

        let required = self.store.participant_count();
        let cell = self.store.get_or_create(id)?;
        cell.decisions.push(decision);
        self.stats.decisions_received += 1;

        let received = cell.decisions.len();
        if received < required {
            return Ok(DecisionOutcome::Pending { received, required });
        }

        let Some(mut merged) = VectorClock::merge_max(cell.decisions.iter()) else {
            cell.decisions.pop();
            self.stats.decisions_received -= 1;
            return Err(InputError::KeySetMismatch {
                cell: id,
                expected: self.store.participants().collect(),
                found: Vec::new(),
            });
        };
        // a block always follows its own chain's previous block
        let predecessor = id.block_number - 1;
        if merged.get(id.chain_id).is_some_and(|own| own < predecessor) {
            tracing::debug!("Cell {} names no own-chain predecessor, implying {}", id, predecessor);
            merged.set(id.chain_id, predecessor);
        }
        cell.final_decision = Some(merged.clone());
        self.stats.cells_merged += 1;
        tracing::debug!("Cell {} merged: {}", id, merged);

        if let Err(violation) = self.finalize(id, &merged) {
            self.halt(violation);
        }
        Ok(DecisionOutcome::Merged)
    }

    /// Reject anything that could corrupt the cell before touching it
    fn validate(&self, id: CellId, decision: &VectorClock) -> Result<(), InputError> {
        let required = self.store.participant_count();
        if required == 0 {
            return Err(InputError::NotConfigured);
        }
        if self.store.chain(id.chain_id).is_none() {
            return Err(InputError::UnknownChain(id.chain_id));
        }
        if id.block_number < 0 {
            return Err(InputError::InvalidEntry {
                cell: id,
                chain_id: id.chain_id,
                value: id.block_number,
            });
        }
        if self.store.is_pruned(id) {
            return Err(InputError::StaleDecision(id));
        }
        if !decision.keys().eq(self.store.participants()) {
            return Err(InputError::KeySetMismatch {
                cell: id,
                expected: self.store.participants().collect(),
                found: decision.keys().collect(),
            });
        }
        if let Some((chain_id, value)) = decision.iter().find(|(_, v)| *v < NO_BLOCK) {
            return Err(InputError::InvalidEntry { cell: id, chain_id, value });
        }
        if let Some(value) = decision.get(id.chain_id).filter(|v| *v >= id.block_number) {
            return Err(InputError::SelfReference { cell: id, value });
        }
        if let Some(cell) = self.store.cell(id) {
            if cell.decisions.len() >= required {
                return Err(InputError::TooManyDecisions { cell: id, required });
            }
        }
        Ok(())
    }

    /// Resolve dependencies of a merged cell, schedule it and every dependent
    /// that became ready in turn, then drain the commit buffer.
    fn finalize(&mut self, id: CellId, merged: &VectorClock) -> Result<(), InvariantViolation> {
        if register_dependencies(&mut self.store, id, merged)? == 0 {
            let mut ready = vec![id];
            while let Some(next) = ready.pop() {
                self.scheduler.schedule(&mut self.store, next)?;
                ready.extend(release_dependents(&mut self.store, next)?);
            }
        }

        let committed = self.scheduler.drain(&mut self.store)?;
        for cell in &committed {
            self.deliver(cell);
        }
        Ok(())
    }

    fn deliver(&mut self, cell: &CommittedCell) {
        self.sink.on_commit(cell);
        self.stats.cells_committed += 1;
        if let Some(window) = self.retention_window {
            let pruned = self.store.prune(cell.chain_id(), window);
            if pruned > 0 {
                self.stats.cells_pruned += pruned as u64;
                tracing::trace!("Pruned {} cells of chain {}", pruned, cell.chain_id());
            }
        }
    }
}
