//! Core types for cross-chain ordering and decision replication

use crate::vector_clock::VectorClock;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sub-chain (region)
pub type ChainId = i32;

/// Height of a block within its sub-chain
pub type BlockNumber = i64;

/// Vector clock entry meaning "no block of that chain referenced"
pub const NO_BLOCK: BlockNumber = -1;

/// Identity of a cell: one block of one sub-chain
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    BorshSerialize, BorshDeserialize,
)]
pub struct CellId {
    pub chain_id: ChainId,
    pub block_number: BlockNumber,
}

impl CellId {
    pub fn new(chain_id: ChainId, block_number: BlockNumber) -> Self {
        Self {
            chain_id,
            block_number,
        }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.chain_id, self.block_number)
    }
}

/// A chain's decision about where one block sits relative to every chain
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockOrderVote {
    /// Chain that produced the block
    pub chain_id: ChainId,
    /// Block being ordered
    pub block_id: BlockNumber,
    /// Reporter's view of every chain when it saw the block
    pub vote_vector: VectorClock,
}

impl BlockOrderVote {
    pub fn new(chain_id: ChainId, block_id: BlockNumber, vote_vector: VectorClock) -> Self {
        Self {
            chain_id,
            block_id,
            vote_vector,
        }
    }

    pub fn cell_id(&self) -> CellId {
        CellId::new(self.chain_id, self.block_id)
    }

    /// Compute the hash of this vote (for signing)
    pub fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.chain_id.to_le_bytes());
        hasher.update(&self.block_id.to_le_bytes());

        for (chain, block) in self.vote_vector.iter() {
            hasher.update(&chain.to_le_bytes());
            hasher.update(&block.to_le_bytes());
        }

        *hasher.finalize().as_bytes()
    }
}

/// A vote as replicated by the reporter's log, with the reporter's signature
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SignedBlockOrderVote {
    pub vote: BlockOrderVote,
    /// Chain whose leader signed the vote
    pub reporter: ChainId,
    /// Ed25519 signature over `vote.compute_hash()`
    pub signature: Vec<u8>,
}

impl SignedBlockOrderVote {
    /// Serialize for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SignedBlockOrderVote serialization should not fail")
    }

    /// Deserialize from network
    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Result of accepting one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Still waiting for decisions from other reporters
    Pending { received: usize, required: usize },
    /// All decisions arrived and the final clock was computed
    Merged,
}

/// Stats about the order manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub participants: usize,
    pub decisions_received: u64,
    pub decisions_rejected: u64,
    pub cells_merged: u64,
    pub cells_committed: u64,
    pub cells_pruned: u64,
    pub live_cells: usize,
    pub scheduled_cells: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_hash_covers_vector() {
        let clock: VectorClock = [(0, 1), (1, -1)].into_iter().collect();
        let vote = BlockOrderVote::new(0, 2, clock.clone());

        let mut other = clock;
        other.set(1, 0);
        let tampered = BlockOrderVote::new(0, 2, other);

        assert_eq!(vote.compute_hash(), vote.clone().compute_hash());
        assert_ne!(vote.compute_hash(), tampered.compute_hash());
    }

    #[test]
    fn test_signed_vote_from_garbage() {
        assert!(SignedBlockOrderVote::from_bytes(&[1, 2, 3]).is_err());
    }
}
