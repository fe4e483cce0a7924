//! Vector clocks over the participating sub-chains
//!
//! A clock maps each chain id to the highest block of that chain observed as a
//! causal prerequisite. `NO_BLOCK` (-1) means "nothing from that chain yet".

use crate::types::{BlockNumber, ChainId, NO_BLOCK};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Chain id -> highest referenced block number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<ChainId, BlockNumber>);

impl VectorClock {
    /// Create an empty clock
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a clock with every participant at `NO_BLOCK`
    pub fn from_participants<I: IntoIterator<Item = ChainId>>(ids: I) -> Self {
        Self(ids.into_iter().map(|id| (id, NO_BLOCK)).collect())
    }

    /// Get the entry for a chain
    pub fn get(&self, chain_id: ChainId) -> Option<BlockNumber> {
        self.0.get(&chain_id).copied()
    }

    /// Set the entry for a chain, returning the previous value
    pub fn set(&mut self, chain_id: ChainId, block: BlockNumber) -> Option<BlockNumber> {
        self.0.insert(chain_id, block)
    }

    /// Iterate entries in ascending chain order
    pub fn iter(&self) -> impl Iterator<Item = (ChainId, BlockNumber)> + '_ {
        self.0.iter().map(|(chain, block)| (*chain, *block))
    }

    /// Chain ids present in this clock
    pub fn keys(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both clocks cover exactly the same chains
    pub fn same_keys(&self, other: &VectorClock) -> bool {
        self.0.len() == other.0.len() && self.0.keys().eq(other.0.keys())
    }

    /// Sum of all components.
    ///
    /// Strictly monotone along happens-before: `a < b` implies
    /// `a.weight() < b.weight()`.
    pub fn weight(&self) -> i64 {
        self.0.values().sum()
    }

    /// Component-wise maximum of a set of clocks.
    ///
    /// Returns `None` when the set is empty or the clocks disagree on their key set.
    pub fn merge_max<'a, I>(clocks: I) -> Option<VectorClock>
    where
        I: IntoIterator<Item = &'a VectorClock>,
    {
        let mut clocks = clocks.into_iter();
        let mut merged = clocks.next()?.clone();
        for clock in clocks {
            if !merged.same_keys(clock) {
                return None;
            }
            for (chain, block) in clock.iter() {
                if let Some(slot) = merged.0.get_mut(&chain) {
                    *slot = (*slot).max(block);
                }
            }
        }
        Some(merged)
    }

    /// Happens-before comparison.
    ///
    /// `Some(Less)` when every component is <= and at least one is <, `Some(Greater)`
    /// for the mirror case, `Some(Equal)` for identical clocks and `None` when the
    /// clocks are concurrent or cover different chains.
    pub fn causal_cmp(&self, other: &VectorClock) -> Option<Ordering> {
        if !self.same_keys(other) {
            return None;
        }
        let mut result = Ordering::Equal;
        for ((_, lhs), (_, rhs)) in self.0.iter().zip(other.0.iter()) {
            match (result, lhs.cmp(rhs)) {
                (_, Ordering::Equal) => {}
                (Ordering::Equal, ord) => result = ord,
                (current, ord) if current != ord => return None,
                _ => {}
            }
        }
        Some(result)
    }
}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.causal_cmp(other)
    }
}

impl FromIterator<(ChainId, BlockNumber)> for VectorClock {
    fn from_iter<T: IntoIterator<Item = (ChainId, BlockNumber)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<ChainId, BlockNumber>> for VectorClock {
    fn from(map: BTreeMap<ChainId, BlockNumber>) -> Self {
        Self(map)
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (chain, block)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", chain, block)?;
        }
        write!(f, "}}")
    }
}
