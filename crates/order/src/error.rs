//! Order manager errors

use crate::types::{BlockNumber, CellId, ChainId};
use thiserror::Error;

/// A decision or setup call was rejected. Nothing was mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("sub-chain ids have not been set")]
    NotConfigured,

    #[error("sub-chain ids are already set")]
    AlreadyConfigured,

    #[error("participant set is empty")]
    EmptyParticipants,

    #[error("chain {0} is not a participant")]
    UnknownChain(ChainId),

    #[error("decision for {cell} covers chains {found:?}, expected {expected:?}")]
    KeySetMismatch {
        cell: CellId,
        expected: Vec<ChainId>,
        found: Vec<ChainId>,
    },

    #[error("decision for {cell} has invalid entry {value} for chain {chain_id}")]
    InvalidEntry {
        cell: CellId,
        chain_id: ChainId,
        value: BlockNumber,
    },

    #[error("decision for {cell} references block {value} of its own chain")]
    SelfReference { cell: CellId, value: BlockNumber },

    #[error("cell {cell} already has all {required} decisions")]
    TooManyDecisions { cell: CellId, required: usize },

    #[error("cell {0} was already committed and pruned")]
    StaleDecision(CellId),
}

/// A block id did not follow its chain's previous block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceViolation {
    #[error("chain {0} is not tracked by this assigner")]
    UnknownChain(ChainId),

    #[error("chain {chain_id} expected block {expected}, got {got}")]
    OutOfOrder {
        chain_id: ChainId,
        expected: BlockNumber,
        got: BlockNumber,
    },
}

/// The order manager's own bookkeeping is inconsistent.
///
/// Never surfaced to callers: the manager halts on it.
#[derive(Error, Debug, Clone)]
#[error("invariant violated at {cell}: {detail}")]
pub(crate) struct InvariantViolation {
    pub cell: CellId,
    pub detail: String,
}

impl InvariantViolation {
    pub(crate) fn new(cell: CellId, detail: impl Into<String>) -> Self {
        Self {
            cell,
            detail: detail.into(),
        }
    }
}
