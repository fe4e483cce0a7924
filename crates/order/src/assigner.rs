//! Proposing side: stamps each new local block with the current view

use crate::error::SequenceViolation;
use crate::types::{BlockNumber, ChainId};
use crate::vector_clock::VectorClock;
use parking_lot::Mutex;

/// Tracks the latest block seen from every chain and hands out snapshots.
///
/// Independent of the order manager's lock.
pub struct OrderAssigner {
    current_view: Mutex<VectorClock>,
}

impl OrderAssigner {
    /// Create an assigner with every chain at `NO_BLOCK`
    pub fn new<I: IntoIterator<Item = ChainId>>(ids: I) -> Self {
        Self {
            current_view: Mutex::new(VectorClock::from_participants(ids)),
        }
    }

    /// Snapshot the view for `block_id` of `chain_id`, then advance that chain.
    ///
    /// `block_id` must directly follow the last block handed out for the chain.
    pub fn get_block_order(&self, chain_id: ChainId, block_id: BlockNumber) -> Result<VectorClock, SequenceViolation> {
        let mut view = self.current_view.lock();
        let last = view
            .get(chain_id)
            .ok_or(SequenceViolation::UnknownChain(chain_id))?;
        if block_id != last + 1 {
            return Err(SequenceViolation::OutOfOrder {
                chain_id,
                expected: last + 1,
                got: block_id,
            });
        }
        let snapshot = view.clone();
        view.set(chain_id, block_id);
        Ok(snapshot)
    }

    /// Copy of the current view
    pub fn current_view(&self) -> VectorClock {
        self.current_view.lock().clone()
    }
}
