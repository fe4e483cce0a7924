//! Arena of cells keyed by (chain, block)
//!
//! All cross-cell edges are `CellId` lookups into this store.

use crate::cell::Cell;
use crate::error::{InputError, InvariantViolation};
use crate::types::{BlockNumber, CellId, ChainId, NO_BLOCK};
use std::collections::BTreeMap;

/// One participating sub-chain
#[derive(Debug)]
pub struct SubChain {
    id: ChainId,
    /// Last committed block; advances by exactly one per commit
    last_finished: BlockNumber,
    /// Highest block whose cell has been dropped
    pruned_through: BlockNumber,
    /// Depth of the cell at `pruned_through`
    pruned_depth: u64,
    cells: BTreeMap<BlockNumber, Cell>,
}

impl SubChain {
    fn new(id: ChainId) -> Self {
        Self {
            id,
            last_finished: NO_BLOCK,
            pruned_through: NO_BLOCK,
            pruned_depth: 0,
            cells: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn last_finished(&self) -> BlockNumber {
        self.last_finished
    }

    pub fn pruned_through(&self) -> BlockNumber {
        self.pruned_through
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

/// Per-chain cell storage plus commit watermarks
#[derive(Debug, Default)]
pub struct VectorClockStore {
    chains: BTreeMap<ChainId, SubChain>,
}

impl VectorClockStore {
    pub fn new<I: IntoIterator<Item = ChainId>>(ids: I) -> Self {
        Self {
            chains: ids.into_iter().map(|id| (id, SubChain::new(id))).collect(),
        }
    }

    /// Number of participating chains (N)
    pub fn participant_count(&self) -> usize {
        self.chains.len()
    }

    pub fn participants(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.chains.keys().copied()
    }

    pub fn chain(&self, id: ChainId) -> Option<&SubChain> {
        self.chains.get(&id)
    }

    pub fn last_finished(&self, id: ChainId) -> Option<BlockNumber> {
        self.chains.get(&id).map(|c| c.last_finished)
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.chains.get(&id.chain_id)?.cells.get(&id.block_number)
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.chains.get_mut(&id.chain_id)?.cells.get_mut(&id.block_number)
    }

    /// Whether the cell's slot has been reclaimed
    pub fn is_pruned(&self, id: CellId) -> bool {
        self.chains
            .get(&id.chain_id)
            .map(|c| id.block_number <= c.pruned_through)
            .unwrap_or(false)
    }

    /// Depth of a scheduled or pruned cell.
    ///
    /// Pruned history answers with the depth recorded at the watermark, which
    /// bounds every pruned cell of that chain from above.
    pub fn reference_depth(&self, id: CellId) -> Option<u64> {
        let chain = self.chains.get(&id.chain_id)?;
        if id.block_number <= chain.pruned_through {
            return Some(chain.pruned_depth);
        }
        chain.cells.get(&id.block_number)?.depth
    }

    /// Fetch a cell, creating it lazily
    pub(crate) fn get_or_create(&mut self, id: CellId) -> Result<&mut Cell, InputError> {
        let participants = self.chains.len();
        let chain = self
            .chains
            .get_mut(&id.chain_id)
            .ok_or(InputError::UnknownChain(id.chain_id))?;
        if id.block_number <= chain.pruned_through {
            return Err(InputError::StaleDecision(id));
        }
        Ok(chain
            .cells
            .entry(id.block_number)
            .or_insert_with(|| Cell::new(id, participants)))
    }

    /// Record the commit of `id`, which must be the next block of its chain
    pub(crate) fn advance(&mut self, id: CellId) -> Result<(), InvariantViolation> {
        let chain = self
            .chains
            .get_mut(&id.chain_id)
            .ok_or_else(|| InvariantViolation::new(id, "commit for untracked chain"))?;
        if chain.last_finished != id.block_number - 1 {
            return Err(InvariantViolation::new(
                id,
                format!("chain last finished {} is not the predecessor", chain.last_finished),
            ));
        }
        let cell = chain
            .cells
            .get_mut(&id.block_number)
            .ok_or_else(|| InvariantViolation::new(id, "committed cell missing from store"))?;
        cell.committed = true;
        chain.last_finished = id.block_number;
        Ok(())
    }

    /// Drop committed cells of a chain that fall more than `window` blocks behind
    /// its last finished block. Returns the number of cells dropped.
    pub(crate) fn prune(&mut self, chain_id: ChainId, window: u64) -> usize {
        let Some(chain) = self.chains.get_mut(&chain_id) else {
            return 0;
        };
        let window = BlockNumber::try_from(window).unwrap_or(BlockNumber::MAX);
        let cutoff = chain.last_finished.saturating_sub(window);
        if cutoff <= chain.pruned_through {
            return 0;
        }
        let kept = chain.cells.split_off(&(cutoff + 1));
        let dropped = std::mem::replace(&mut chain.cells, kept);
        if let Some(depth) = dropped.values().filter_map(|c| c.depth).max() {
            chain.pruned_depth = chain.pruned_depth.max(depth);
        }
        chain.pruned_through = cutoff;
        dropped.len()
    }

    /// Cells currently held across all chains
    pub fn live_cells(&self) -> usize {
        self.chains.values().map(|c| c.cells.len()).sum()
    }
}
